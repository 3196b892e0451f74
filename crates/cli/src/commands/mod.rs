pub mod context;
pub mod doctor;
pub mod onboard;
pub mod process;
pub mod seed;
pub mod serve;
pub mod sessions;
pub mod status;
