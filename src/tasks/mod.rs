//! Task lifecycle — data model, state machine service, and clock seam.

pub mod clock;
pub mod model;
pub mod service;

pub use clock::{Clock, FixedClock, SystemClock};
pub use model::{NewTask, Sector, Task, TaskId, TaskStatus, Worker};
pub use service::{CreateTasks, TaskService};
