// ============================================================
// Layer 3 — Configuration Errors
// ============================================================
// Typed errors for everything that can be rejected before a
// single byte is downloaded or a tensor is allocated.
// The application layer wraps them in anyhow::Error.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("unknown {kind} '{value}' (expected one of: {choices})")]
    UnknownChoice {
        kind:    &'static str,
        value:   String,
        choices: &'static str,
    },

    #[error("dataset {dataset} yields {native}-channel images but image_channels is {configured}")]
    ChannelMismatch {
        dataset:    &'static str,
        native:     usize,
        configured: usize,
    },

    #[error("no normalization constants for {0}-channel images (supported: 1, 3)")]
    UnsupportedChannels(usize),

    #[error("image_size {size} is too small for {model}: at least {minimum} pixels are required")]
    ImageTooSmall {
        model:   String,
        size:    usize,
        minimum: usize,
    },

    #[error("dataset {dataset} has {native} classes but num_classes is {configured}")]
    ClassMismatch {
        dataset:    &'static str,
        native:     usize,
        configured: usize,
    },

    #[error("{name} must be greater than zero")]
    NotPositive { name: &'static str },

    #[error("nesterov momentum requires momentum > 0")]
    NesterovWithoutMomentum,

    #[error("loader for '{0}' requested before setup() prepared it")]
    NotSetUp(&'static str),
}
