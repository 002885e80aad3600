pub mod auth_provider;
pub mod rest_provider;
pub mod util;

pub use auth_provider::AuthProvider;
pub use rest_provider::RestProvider;
