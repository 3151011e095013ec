//! Buffers for secret material.
//!
//! Every allocation made by [`SecureBuffer`] goes through the secure path of
//! [`SecureAllocator`], so passwords and attachment contents are wiped when
//! the memory is released or the buffer grows into a new block.

use std::alloc::Layout;
use std::fmt;
use std::ops::Deref;
use std::ptr::NonNull;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::{VaultError, VaultResult};
use crate::secure_alloc::{AllocPath, SecureAllocator};

/// Growable byte buffer allocated through the secure path.
pub struct SecureBuffer {
    ptr: NonNull<u8>,
    len: usize,
    capacity: usize,
}

// SAFETY: the buffer exclusively owns its block, like a `Vec<u8>`.
unsafe impl Send for SecureBuffer {}
// SAFETY: shared access only hands out `&[u8]`.
unsafe impl Sync for SecureBuffer {}

impl SecureBuffer {
    /// Create an empty buffer. Nothing is allocated until data is written.
    pub fn new() -> Self {
        Self {
            ptr: NonNull::dangling(),
            len: 0,
            capacity: 0,
        }
    }

    /// Create an empty buffer with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut buffer = Self::new();
        buffer.reserve(capacity);
        buffer
    }

    /// Copy `bytes` into a fresh secure block.
    pub fn from_slice(bytes: &[u8]) -> Self {
        let mut buffer = Self::with_capacity(bytes.len());
        buffer.extend_from_slice(bytes);
        buffer
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn as_slice(&self) -> &[u8] {
        if self.capacity == 0 {
            return &[];
        }
        // SAFETY: `len` initialized bytes live at `ptr`.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        if self.capacity == 0 {
            return &mut [];
        }
        // SAFETY: `len` initialized bytes live at `ptr`, uniquely borrowed.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Make sure at least `additional` more bytes fit without reallocating.
    pub fn reserve(&mut self, additional: usize) {
        let required = self
            .len
            .checked_add(additional)
            .expect("secure buffer capacity overflow");
        if required <= self.capacity {
            return;
        }

        let new_capacity = required.max(self.capacity.saturating_mul(2)).max(16);
        let layout = Layout::array::<u8>(new_capacity).expect("secure buffer layout");
        let new_ptr = SecureAllocator.allocate(layout, AllocPath::Secure);

        let len = self.len;
        if self.capacity > 0 {
            // SAFETY: both blocks are valid for `len` bytes and distinct.
            unsafe {
                std::ptr::copy_nonoverlapping(self.ptr.as_ptr(), new_ptr.as_ptr(), len);
            }
            self.release();
        }

        self.len = len;
        self.ptr = new_ptr;
        self.capacity = new_capacity;
    }

    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.reserve(bytes.len());
        // SAFETY: `reserve` left room for `bytes.len()` more bytes.
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.ptr.as_ptr().add(self.len), bytes.len());
        }
        self.len += bytes.len();
    }

    /// Shorten the buffer, wiping the bytes that fall off the end.
    pub fn truncate(&mut self, len: usize) {
        if len >= self.len {
            return;
        }
        self.as_mut_slice()[len..].zeroize();
        self.len = len;
    }

    /// Wipe the contents and reset the length. Capacity is kept.
    pub fn clear(&mut self) {
        self.truncate(0);
    }

    fn release(&mut self) {
        if self.capacity == 0 {
            return;
        }
        let layout = Layout::array::<u8>(self.capacity).expect("secure buffer layout");
        // SAFETY: the block was allocated in `reserve` with exactly this layout.
        unsafe { SecureAllocator.deallocate(self.ptr, layout) };
        self.ptr = NonNull::dangling();
        self.capacity = 0;
        self.len = 0;
    }
}

impl Default for SecureBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SecureBuffer {
    fn drop(&mut self) {
        self.release();
    }
}

impl Clone for SecureBuffer {
    fn clone(&self) -> Self {
        Self::from_slice(self.as_slice())
    }
}

impl PartialEq for SecureBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Eq for SecureBuffer {}

impl Deref for SecureBuffer {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl From<&[u8]> for SecureBuffer {
    fn from(value: &[u8]) -> Self {
        Self::from_slice(value)
    }
}

impl From<Vec<u8>> for SecureBuffer {
    fn from(mut value: Vec<u8>) -> Self {
        let buffer = Self::from_slice(&value);
        value.zeroize();
        buffer
    }
}

impl fmt::Debug for SecureBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureBuffer")
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

/// UTF-8 string stored in a [`SecureBuffer`].
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SecretString {
    buffer: SecureBuffer,
}

impl SecretString {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap raw bytes, failing if they are not valid UTF-8.
    pub fn from_utf8(buffer: SecureBuffer) -> VaultResult<Self> {
        std::str::from_utf8(buffer.as_slice()).map_err(|_| VaultError::InvalidUtf8)?;
        Ok(Self { buffer })
    }

    pub fn as_str(&self) -> &str {
        // SAFETY: every constructor only stores valid UTF-8.
        unsafe { std::str::from_utf8_unchecked(self.buffer.as_slice()) }
    }

    pub fn push_str(&mut self, value: &str) {
        self.buffer.extend_from_slice(value.as_bytes());
    }

    /// Wipe the contents.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Deref for SecretString {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self {
            buffer: SecureBuffer::from_slice(value.as_bytes()),
        }
    }
}

impl From<String> for SecretString {
    fn from(mut value: String) -> Self {
        let secret = Self::from(value.as_str());
        value.zeroize();
        secret
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretString(***)")
    }
}

impl Serialize for SecretString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SecretString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(Self::from(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_grows_and_keeps_contents() {
        let mut buffer = SecureBuffer::new();
        assert!(buffer.is_empty());
        for chunk in [b"abc".as_slice(), b"defghijklmnop", b"qrstuvwxyz0123456789"] {
            buffer.extend_from_slice(chunk);
        }
        assert_eq!(buffer.as_slice(), b"abcdefghijklmnopqrstuvwxyz0123456789");
        assert!(buffer.capacity() >= buffer.len());
    }

    #[test]
    fn truncate_wipes_tail() {
        let mut buffer = SecureBuffer::from_slice(b"hunter2hunter2");
        buffer.truncate(6);
        assert_eq!(buffer.as_slice(), b"hunter");
        // The wiped bytes are still inside the block.
        let tail = unsafe { std::slice::from_raw_parts(buffer.ptr.as_ptr().add(6), 8) };
        assert!(tail.iter().all(|b| *b == 0));
    }

    #[test]
    fn secret_string_redacts_debug_output() {
        let secret = SecretString::from("correct horse");
        assert_eq!(&*secret, "correct horse");
        assert_eq!(format!("{secret:?}"), "SecretString(***)");
    }

    #[test]
    fn secret_string_rejects_invalid_utf8() {
        let buffer = SecureBuffer::from_slice(&[0xff, 0xfe]);
        assert!(matches!(SecretString::from_utf8(buffer), Err(VaultError::InvalidUtf8)));
    }

    #[test]
    fn empty_secret_compares_equal_to_default() {
        assert_eq!(SecretString::from(""), SecretString::default());
        assert_eq!(SecretString::from(String::from("x")).len(), 1);
    }

    #[test]
    fn pushing_onto_existing_secret_keeps_prefix() {
        let mut secret = SecretString::from("correct-horse");
        secret.push_str("-battery-staple");
        assert_eq!(secret.as_str(), "correct-horse-battery-staple");
        secret.push_str(&"x".repeat(100));
        assert_eq!(secret.len(), 128);
        assert!(secret.as_str().starts_with("correct-horse-battery-staple"));
    }
}
