pub mod auth;
pub mod complaint;
pub mod map;
pub mod report_cache;

pub use auth::AuthService;
pub use complaint::ComplaintService;
pub use map::MapService;
pub use report_cache::ReportCache;
