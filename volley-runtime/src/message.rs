use serde::{Deserialize, Serialize};

/// Queue message codec. The wire form is the JSON of `inner` itself, with no extra envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message<M> {
    inner: M,
}

impl<M> Message<M> {
    pub fn new(inner: M) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> M {
        self.inner
    }
}

impl<M: Serialize> Message<M> {
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

impl<M: for<'a> Deserialize<'a>> Message<M> {
    pub fn from_bytes(bytes: &[u8]) -> Result<Message<M>, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
