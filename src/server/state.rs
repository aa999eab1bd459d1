use crate::config::Settings;
use crate::plots::Renderer;
use crate::registry::ModelRegistry;

/// Shared, read-only state handed to every handler.
#[derive(Debug)]
pub struct AppState {
    pub registry: ModelRegistry,
    pub settings: Settings,
    pub renderer: Renderer,
}

impl AppState {
    pub fn new(registry: ModelRegistry, settings: Settings) -> Self {
        let renderer = Renderer::from_font_path(settings.font_path.as_deref());
        Self {
            registry,
            settings,
            renderer,
        }
    }
}
