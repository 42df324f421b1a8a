//! Frame transport.
//!
//! Each message is a 4-byte big-endian length followed by one JSON
//! [`Frame`](shared_types::Frame).

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

/// Size of the length prefix.
pub const HEADER_LEN: usize = 4;

/// Largest frame either side accepts.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

pub type Transport<T> = Framed<T, LengthDelimitedCodec>;

/// Wrap a byte stream in the length-delimited codec.
pub fn framed_transport<T>(io: T, max_frame_length: usize) -> Transport<T>
where
    T: AsyncRead + AsyncWrite,
{
    LengthDelimitedCodec::builder()
        .length_field_length(HEADER_LEN)
        .max_frame_length(max_frame_length)
        .big_endian()
        .new_framed(io)
}
