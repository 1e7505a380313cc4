//! Protocol errors
//!
//! Every request either succeeds or fails with one `RrError`, which the
//! dispatcher turns into an X error packet (code + error value).

use std::collections::TryReserveError;

use area_randr_proto::DecodeError;
use x11rb::protocol::randr;
use x11rb::protocol::xproto;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RrError {
    #[error("unknown request {0}")]
    Request(u8),

    #[error("request length mismatch")]
    Length,

    #[error("bad value {0}")]
    Value(u32),

    #[error("invalid atom {0}")]
    Atom(u32),

    #[error("type or format mismatch")]
    Match,

    #[error("no such property {0}")]
    Name(u32),

    #[error("access denied ({0})")]
    Access(u32),

    #[error("allocation failed")]
    Alloc,

    #[error("no such output {0:#x}")]
    Output(u32),

    #[error("no such window {0:#x}")]
    Window(u32),

    /// The driver refused a staged value
    #[error("driver rejected value for property {0}")]
    Rejected(u32),
}

impl RrError {
    /// X error code; `first_error` is the extension's error base
    pub fn code(&self, first_error: u8) -> u8 {
        match self {
            Self::Request(_) => xproto::REQUEST_ERROR,
            Self::Length => xproto::LENGTH_ERROR,
            Self::Value(_) => xproto::VALUE_ERROR,
            Self::Atom(_) => xproto::ATOM_ERROR,
            Self::Match => xproto::MATCH_ERROR,
            Self::Name(_) => xproto::NAME_ERROR,
            Self::Access(_) | Self::Rejected(_) => xproto::ACCESS_ERROR,
            Self::Alloc => xproto::ALLOC_ERROR,
            Self::Output(_) => first_error.wrapping_add(randr::BAD_OUTPUT_ERROR),
            Self::Window(_) => xproto::WINDOW_ERROR,
        }
    }

    /// Value echoed back in the error packet
    pub fn bad_value(&self) -> u32 {
        match *self {
            Self::Request(minor) => u32::from(minor),
            Self::Value(v)
            | Self::Atom(v)
            | Self::Name(v)
            | Self::Access(v)
            | Self::Output(v)
            | Self::Window(v)
            | Self::Rejected(v) => v,
            Self::Length | Self::Match | Self::Alloc => 0,
        }
    }
}

impl From<DecodeError> for RrError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::Length => Self::Length,
            DecodeError::UnknownRequest(minor) => Self::Request(minor),
        }
    }
}

impl From<TryReserveError> for RrError {
    fn from(_: TryReserveError) -> Self {
        Self::Alloc
    }
}

pub type Result<T> = std::result::Result<T, RrError>;
