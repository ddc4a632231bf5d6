// sheetkeeper_sheet: character sheet model for sheetkeeper campaigns.
//
// This crate owns everything about a single character record and has no
// knowledge of networking or storage. The server crate loads and stores
// records; clients edit them locally and send them back whole.
//
// Module overview:
// - `stats.rs`:     Reference tables (`Stat`, `Skill`, skill → governing stat)
//                   and the pure modifier arithmetic (the "stat engine").
// - `character.rs`: `CharacterRecord`: raw values, proficiencies, derived
//                   modifier maps, setters, sheet rendering, JSON encoding.
// - `error.rs`:     `SheetError` for rejected setter arguments.
//
// Design decisions:
// - **Enums as reference data.** The stat and skill lists are `const` arrays
//   on the enum types, so they are initialized before any code runs and can
//   never be mutated. Lookup by name goes through `FromStr`.
// - **Derived maps are never trusted from input.** Every setter recomputes
//   what depends on it, and deserialization recomputes everything (see
//   `CharacterRecord`'s `serde(from)` conversion).

pub mod character;
pub mod error;
pub mod stats;

pub use character::CharacterRecord;
pub use error::SheetError;
pub use stats::{Skill, Stat, modifier_from_value, prof_level, proficiency_bonus};
