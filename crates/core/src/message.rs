//! Write messages buffered by a transaction

/// Operation tag of a write-set entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteOp {
    /// Write a full value, replacing whatever is stored
    Insert,
    /// Merge a delta into the stored value
    Update,
    /// Remove the key
    Delete,
}

impl WriteOp {
    /// Insert and Delete fully determine the resulting value; Update does not
    pub fn is_definitive(self) -> bool {
        !matches!(self, WriteOp::Update)
    }
}

/// A local write: the operation plus its payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Full value
    Insert(Vec<u8>),
    /// Partial update, merged with the store's merge operator
    Update(Vec<u8>),
    /// Deletion
    Delete,
}

impl Message {
    /// Operation tag
    pub fn op(&self) -> WriteOp {
        match self {
            Message::Insert(_) => WriteOp::Insert,
            Message::Update(_) => WriteOp::Update,
            Message::Delete => WriteOp::Delete,
        }
    }

    /// True for Insert and Delete
    pub fn is_definitive(&self) -> bool {
        self.op().is_definitive()
    }

    /// Payload bytes (empty for Delete)
    pub fn payload(&self) -> &[u8] {
        match self {
            Message::Insert(v) | Message::Update(v) => v,
            Message::Delete => &[],
        }
    }
}
