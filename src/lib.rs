// LED effect preview host - Shared Library
// Color model, effect machines, script loader, scheduler and control panels

pub mod color;
pub mod config;
pub mod device;
pub mod effect;
pub mod loader;
pub mod scheduler;
pub mod session;
pub mod ui;

pub use color::{Rgb, TaggedColor};
pub use effect::{EffectConfig, EffectError, EffectFactory, EffectMachine, LedBuffer, MachineStatus};
pub use loader::{EffectLoader, LoadError, LoadedEffect, UiMode};
pub use scheduler::{Scheduler, TickErrorPolicy};
pub use session::{PreviewSession, SessionOptions};
