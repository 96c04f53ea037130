pub mod context;
pub mod frame;
pub mod gateway;
pub mod journal;
pub mod paths;
pub mod providers;
pub mod settings;
pub mod util;
