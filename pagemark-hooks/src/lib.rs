use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use tracing::{debug, warn};

use pagemark_store::{document_key, PageStore};

/// Host viewer surface. Pages are 1-indexed; `goto_page` may fail inside the
/// host, in which case the position is simply not restored.
pub trait Viewer {
    fn document_path(&self) -> Option<PathBuf>;
    fn current_page(&self) -> u32;
    fn goto_page(&mut self, page: u32) -> Result<()>;
    fn is_viewer_mode(&self) -> bool;
}

/// Lifecycle events the host fires. The host must fire `BeforeActivation`
/// before any activation-internal navigation and `AfterActivation` once
/// activation has completed; `ModeEntered` falls between the two.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    BeforeActivation,
    AfterActivation,
    ModeEntered,
    PageChanged,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveState {
    Enabled,
    Disabled,
}

type Handler = Box<dyn FnMut(&mut dyn Viewer)>;

/// Per-event handler lists, run in registration order.
#[derive(Default)]
pub struct HookRegistry {
    before_activation: Vec<Handler>,
    after_activation: Vec<Handler>,
    mode_entered: Vec<Handler>,
    page_changed: Vec<Handler>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, event: Lifecycle, handler: impl FnMut(&mut dyn Viewer) + 'static) {
        self.handlers_mut(event).push(Box::new(handler));
    }

    pub fn emit(&mut self, event: Lifecycle, viewer: &mut dyn Viewer) {
        for handler in self.handlers_mut(event) {
            handler(viewer);
        }
    }

    fn handlers_mut(&mut self, event: Lifecycle) -> &mut Vec<Handler> {
        match event {
            Lifecycle::BeforeActivation => &mut self.before_activation,
            Lifecycle::AfterActivation => &mut self.after_activation,
            Lifecycle::ModeEntered => &mut self.mode_entered,
            Lifecycle::PageChanged => &mut self.page_changed,
        }
    }
}

/// Wires viewer lifecycle events to the page store. One controller per
/// viewer session; the guard flag it holds spans the session, not a single
/// document.
pub struct Controller {
    store: PageStore,
    guard: SaveState,
}

impl Controller {
    pub fn new(store: PageStore) -> Self {
        Self {
            store,
            guard: SaveState::Enabled,
        }
    }

    pub fn suspend_saves(&mut self) {
        self.guard = SaveState::Disabled;
    }

    pub fn resume_saves(&mut self) {
        self.guard = SaveState::Enabled;
    }

    pub fn saves_enabled(&self) -> bool {
        self.guard == SaveState::Enabled
    }

    /// `ModeEntered` handler: navigate to the stored page for the active
    /// document, if any.
    pub fn restore(&self, viewer: &mut dyn Viewer) {
        if !viewer.is_viewer_mode() {
            return;
        }
        let key = match viewer.document_path() {
            Some(path) => document_key(&path),
            None => return,
        };
        if key.is_empty() {
            return;
        }
        let page = match self.store.get_page(&key) {
            Some(page) => page,
            None => {
                debug!(key, "no stored page for document");
                return;
            }
        };
        if let Err(err) = viewer.goto_page(page) {
            warn!(?err, key, page, "failed to restore stored page");
        }
    }

    /// `PageChanged` handler: save the current page unless saves are
    /// suspended for activation or the buffer is not in viewer mode.
    pub fn record(&self, viewer: &dyn Viewer) {
        if self.guard == SaveState::Disabled {
            debug!("page change during activation, save suppressed");
            return;
        }
        if !viewer.is_viewer_mode() {
            return;
        }
        let key = match viewer.document_path() {
            Some(path) => document_key(&path),
            None => return,
        };
        if key.is_empty() {
            return;
        }
        self.store.set_page(&key, viewer.current_page());
    }
}

/// Suspends saves for the lifetime of the scope and resumes them on drop,
/// for hosts that wrap their own activation call instead of firing the
/// before/after events.
pub struct ActivationScope {
    controller: Arc<Mutex<Controller>>,
}

impl ActivationScope {
    pub fn begin(controller: &Arc<Mutex<Controller>>) -> Self {
        controller.lock().suspend_saves();
        Self {
            controller: Arc::clone(controller),
        }
    }
}

impl Drop for ActivationScope {
    fn drop(&mut self) {
        self.controller.lock().resume_saves();
    }
}

/// Single setup call: builds the controller and registers all four lifecycle
/// handlers against the registry. Returns the shared controller handle.
pub fn install(registry: &mut HookRegistry, store: PageStore) -> Arc<Mutex<Controller>> {
    let controller = Arc::new(Mutex::new(Controller::new(store)));

    let shared = Arc::clone(&controller);
    registry.register(Lifecycle::BeforeActivation, move |_viewer| {
        shared.lock().suspend_saves();
    });

    let shared = Arc::clone(&controller);
    registry.register(Lifecycle::AfterActivation, move |_viewer| {
        shared.lock().resume_saves();
    });

    let shared = Arc::clone(&controller);
    registry.register(Lifecycle::ModeEntered, move |viewer| {
        shared.lock().restore(viewer);
    });

    let shared = Arc::clone(&controller);
    registry.register(Lifecycle::PageChanged, move |viewer| {
        shared.lock().record(viewer);
    });

    controller
}
