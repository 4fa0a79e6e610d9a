pub mod overrides;
pub mod patterns;
pub mod resolver;
pub mod slots;

pub use overrides::OverrideStore;
pub use patterns::PatternStore;
pub use resolver::SlotResolverService;
pub use slots::OpenSlotService;
