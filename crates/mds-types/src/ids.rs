strong_type!(InodeId, u64);
strong_type!(NodeId, u32);
strong_type!(ObjectId, u64);

impl InodeId {
    /// The filesystem root directory.
    pub const ROOT: InodeId = InodeId(1);
}
