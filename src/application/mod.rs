// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer turns a validated configuration into a finished
// experiment by coordinating all the other layers.
//
// Rules for this layer:
//   - No ML math or model code here
//   - No argument parsing or result printing (that's Layer 1)
//   - Only workflow coordination and name resolution
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// Closed name sets selectable from the command line
pub mod registry;

// The fit / test workflow
pub mod experiment;
