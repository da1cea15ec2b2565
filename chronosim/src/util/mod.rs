//! Small internal building blocks shared across modules, mirroring the
//! teacher's own `util` module (`SyncCell`, generalized here to any
//! tearable atomic rather than just wall-clock time).

pub mod sync_cell;
