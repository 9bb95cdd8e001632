pub mod home;
pub mod logging;
