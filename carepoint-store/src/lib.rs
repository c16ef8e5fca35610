pub mod app_config;
pub mod file_store;
pub mod http_backend;

pub use app_config::Config;
pub use file_store::FileStore;
pub use http_backend::HttpClinicBackend;
