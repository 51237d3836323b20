//! Channel layout of a mixing buffer.

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Channels {
    #[default]
    Mono,
    Stereo,
}

impl Channels {
    pub fn from_stereo(stereo: bool) -> Self {
        if stereo {
            Channels::Stereo
        } else {
            Channels::Mono
        }
    }

    #[inline]
    pub fn count(self) -> usize {
        match self {
            Channels::Mono => 1,
            Channels::Stereo => 2,
        }
    }

    #[inline]
    pub fn is_stereo(self) -> bool {
        self == Channels::Stereo
    }
}

impl TryFrom<i32> for Channels {
    type Error = Error;

    fn try_from(n: i32) -> Result<Self> {
        match n {
            1 => Ok(Channels::Mono),
            2 => Ok(Channels::Stereo),
            other => Err(Error::InvalidChannelCount(other)),
        }
    }
}
