pub mod auth;
pub mod books;

use shelf_authz::AuthContext;
use shelf_kernel::{settings::Settings, ModuleRegistry};

/// Build the registry holding every shelf module, wired from `settings`.
pub fn build_registry(settings: &Settings) -> anyhow::Result<ModuleRegistry> {
    let auth = AuthContext::from_settings(&settings.auth)?;

    let mut registry = ModuleRegistry::new();
    registry.register(auth::create_module(auth.clone()));
    registry.register(books::create_module(&settings.catalog, auth.access)?);
    Ok(registry)
}
