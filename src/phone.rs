//! Phone identifiers and chat addresses.
//!
//! Chat addresses look like `5491122223333@c.us`. Everything the bot compares
//! (admin allow-list, worker directory) uses the digits-only form.

use std::sync::LazyLock;

use regex::Regex;

/// Suffix for direct (one-to-one) chat addresses.
pub const DIRECT_SUFFIX: &str = "@c.us";

static PHONE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\+?\d{6,}").expect("valid phone token regex"));

/// Canonicalize a phone number or chat address to its digits.
///
/// ```
/// use field_dispatch::phone::normalize;
/// assert_eq!(normalize("5491122223333@c.us"), "5491122223333");
/// assert_eq!(normalize("+54 9 11 2222-3333"), "5491122223333");
/// ```
pub fn normalize(address: &str) -> String {
    let local = address.split('@').next().unwrap_or_default();
    local.chars().filter(char::is_ascii_digit).collect()
}

/// Build the direct chat address for a phone number.
pub fn chat_address(phone: &str) -> String {
    format!("{}{DIRECT_SUFFIX}", normalize(phone))
}

/// Group chats and status broadcasts are not addressed to the bot.
pub fn is_direct_address(address: &str) -> bool {
    !(address.ends_with("@g.us") || address.starts_with("status@") || address.ends_with("@broadcast"))
}

/// Find the first phone-looking token (`+?\d{6,}`) in `text`.
///
/// Returns the normalized phone and `text` with the token removed.
pub fn extract_phone_token(text: &str) -> Option<(String, String)> {
    let m = PHONE_TOKEN.find(text)?;
    let rest = format!("{}{}", &text[..m.start()], &text[m.end()..]);
    let rest = rest.split_whitespace().collect::<Vec<_>>().join(" ");
    Some((normalize(m.as_str()), rest))
}
