// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types that describe the cross-validation dataset.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain structs, enums, and traits
//
// The manifest assigns every row a fold index and a role
// (Train / Validation / Test) for that fold. Everything the
// training loop consumes is described in these terms.
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// Train / Validation / Test roles and per-fold index lists
pub mod split;

// One resolved manifest row (fold, role, image path, mask path)
pub mod manifest_row;

// Core abstractions (traits) that other layers implement
pub mod traits;
