//! Length-delimited postcard framing for the peer RPC protocol.
//!
//! Combines [`LengthDelimitedCodec`] framing with postcard serialization so
//! any serde type can cross a connection as one binary frame.

use std::io;
use std::marker::PhantomData;

use bytes::{Bytes, BytesMut};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use crate::messages::{PeerReply, PeerRequest};

const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

/// A codec that postcard-encodes `Enc` frames and decodes `Dec` frames.
///
/// The two type parameters fix the direction of the connection: a client
/// encodes requests and decodes replies, the server side is the mirror
/// image.
pub struct RpcCodec<Enc, Dec> {
    inner: LengthDelimitedCodec,
    _marker: PhantomData<fn(Enc) -> Dec>,
}

/// Client-side framing: requests out, replies in.
pub type ClientCodec<V> = RpcCodec<PeerRequest<V>, PeerReply<V>>;

/// Server-side framing: replies out, requests in.
pub type ServerCodec<V> = RpcCodec<PeerReply<V>, PeerRequest<V>>;

impl<Enc, Dec> RpcCodec<Enc, Dec> {
    /// Create a codec with a 16 MiB maximum frame length.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: LengthDelimitedCodec::builder()
                .max_frame_length(MAX_FRAME_LENGTH)
                .new_codec(),
            _marker: PhantomData,
        }
    }
}

impl<Enc, Dec> Default for RpcCodec<Enc, Dec> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Enc, Dec> Decoder for RpcCodec<Enc, Dec>
where
    Dec: DeserializeOwned,
{
    type Item = Dec;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.inner.decode(src)? {
            Some(bytes) => {
                let item = postcard::from_bytes(&bytes)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                Ok(Some(item))
            }
            None => Ok(None),
        }
    }
}

impl<Enc, Dec> Encoder<Enc> for RpcCodec<Enc, Dec>
where
    Enc: Serialize,
{
    type Error = io::Error;

    fn encode(&mut self, item: Enc, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let bytes = postcard::to_allocvec(&item)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.inner.encode(Bytes::from(bytes), dst)
    }
}
