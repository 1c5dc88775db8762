// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain structs, enums and traits describing what the system
// works with: labeled images, lifecycle stages, monitor modes, configuration
// errors and the provider/snapshot abstractions.
//
// No Burn types live here.

pub mod error;

pub mod image;

pub mod monitor;

pub mod stage;

pub mod traits;
