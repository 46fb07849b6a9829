//! Shared primitive types used across the settlement core.

/// The earning participant ("modelo") whose revenue is settled.
pub type ModelId = String;

/// A revenue platform identifier, e.g. "big7" or "chaturbate".
pub type PlatformId = String;

/// A group of models inside a sede.
pub type GroupId = String;

/// A physical/administrative site containing one or more groups.
pub type SedeId = String;

/// The administrator identity recorded on lifecycle operations.
/// Supplied by the identity collaborator; never authenticated here.
pub type AdminId = String;
