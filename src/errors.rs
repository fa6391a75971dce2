//! Error Types
//!
//! This module defines the error types used throughout the engine.
//!
//! # Overview
//!
//! The main error type [`SagaError`] covers the failure modes of the
//! simulation core:
//! - World construction failures
//! - Rejected spawn and level operations
//! - Scene graph precondition violations
//! - Physics solver boundary errors
//!
//! Recoverable precondition violations never cross a frame boundary: the
//! offending operation is rejected, logged, and the caller decides recovery.
//!
//! # Usage
//!
//! Public APIs that can fail return [`Result<T>`], an alias for
//! `std::result::Result<T, SagaError>`.

use thiserror::Error;

/// The main error type for the Saga engine core.
///
/// Each variant provides specific context about what went wrong.
#[derive(Error, Debug)]
pub enum SagaError {
    // ========================================================================
    // World construction
    // ========================================================================
    /// The physics world (or another required world subsystem) could not be
    /// created. A world that failed to construct must not be used.
    #[error("Failed to create world: {0}")]
    WorldCreateFailed(String),

    // ========================================================================
    // Spawn & factory errors
    // ========================================================================
    /// The spawn class could not be resolved by the factory.
    #[error("Unknown actor class: {0}")]
    UnknownClass(String),

    /// The resolved class is registered in a different factory.
    #[error("Class {0} is not an actor class")]
    NotAnActorClass(String),

    /// The spawn template's final class does not match the spawn class.
    #[error("Spawn template class mismatch: expected {expected}, got {actual}")]
    TemplateClassMismatch {
        /// Class requested by the spawn info
        expected: String,
        /// Final class of the supplied template
        actual: String,
    },

    // ========================================================================
    // Scene graph errors
    // ========================================================================
    /// Attaching a scene component to itself or one of its descendants.
    #[error("Attach would create a cycle")]
    AttachCycle,

    /// Attaching to a named socket of a parent that is not skinned, or the
    /// socket name did not resolve.
    #[error("Socket attach failed: {0}")]
    SocketAttachFailed(String),

    /// The referenced component does not exist or is pending kill.
    #[error("Stale component handle")]
    StaleComponent,

    /// The referenced actor does not exist or is pending kill.
    #[error("Stale actor handle")]
    StaleActor,

    // ========================================================================
    // Level errors
    // ========================================================================
    /// The persistent level cannot be added or removed at runtime.
    #[error("The persistent level cannot be {0}")]
    PersistentLevel(&'static str),

    /// The level is not owned by this world.
    #[error("Level is not in this world")]
    LevelNotInWorld,

    // ========================================================================
    // Physics errors
    // ========================================================================
    /// Scene graph structural mutation attempted during a physics step.
    #[error("Structural mutation during physics update")]
    DuringPhysicsUpdate,

    /// The solver rejected the body registration.
    #[error("Solver rejected body: {0}")]
    SolverRejectedBody(String),
}

/// Alias for `Result<T, SagaError>`.
pub type Result<T> = std::result::Result<T, SagaError>;
