//! Capability tables.
//!
//! A capability table describes how to operate on one container type. The
//! bridge borrows a table per call and never owns it, so the same operations
//! run over native Rust collections and over foreign containers reached through
//! function pointers.

/// Every container reports its element count and a short type name.
pub trait SizeCaps<C: ?Sized> {
    /// Name used in error messages and `repr` output (`"list"`, `"dict"`, ...).
    fn type_name(&self) -> &str;

    fn size(&self, container: &C) -> usize;
}

/// Positional access.
pub trait SequenceCaps<C: ?Sized>: SizeCaps<C> {
    type Elem: ?Sized;

    /// Element at an already-normalized `index`. `None` means the slot is
    /// empty or the container refused the access.
    fn at<'a>(&self, container: &'a C, index: usize) -> Option<&'a Self::Elem>;
}

/// Keyed lookup plus native iteration.
pub trait MapCaps<C: ?Sized>: SizeCaps<C> {
    type Key: ?Sized;
    type Value: ?Sized;

    fn contains(&self, container: &C, key: &Self::Key) -> bool;

    fn get<'a>(&self, container: &'a C, key: &Self::Key) -> Option<&'a Self::Value>;

    /// Visit every entry in the container's own iteration order.
    fn for_each_item<'a>(
        &self,
        container: &'a C,
        visit: &mut dyn FnMut(&'a Self::Key, &'a Self::Value),
    );

    /// Printable form of a key for error messages.
    fn describe_key(&self, key: &Self::Key) -> String;
}

/// Hashed (or ordered) membership test.
pub trait MembershipCaps<C: ?Sized>: SizeCaps<C> {
    type Needle: ?Sized;

    fn contains(&self, container: &C, needle: &Self::Needle) -> bool;
}
