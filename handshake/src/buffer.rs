// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Growable byte buffer used to accumulate a handshake request until the
//! terminating CRLFCRLF is observed.

use std::{
    alloc::{self, Layout},
    borrow::{Borrow, BorrowMut},
    io::Write,
    marker::PhantomData,
    ops::{Deref, DerefMut},
    ptr::{copy, copy_nonoverlapping, NonNull},
};

/// A growable, contiguous byte buffer.
#[derive(Debug)]
pub struct Buffer {
    ptr: NonNull<u8>,
    cap: usize,
    read_offset: usize,
    write_offset: usize,
    desired_capacity: usize,
    _marker: PhantomData<u8>,
}

impl Buffer {
    /// Creates a new `Buffer` with the given desired capacity.
    pub fn new(desired_capacity: usize) -> Self {
        let mut result = Self {
            ptr: NonNull::dangling(),
            cap: 0,
            read_offset: 0,
            write_offset: 0,
            desired_capacity: desired_capacity.next_power_of_two(),
            _marker: PhantomData,
        };

        if desired_capacity > 0 {
            result.desired_capacity = result.desired_capacity.max(2);
            result.grow();
        }
        result
    }

    /// Reserves at least `capacity` additional bytes of space.
    pub fn reserve(&mut self, capacity: usize) {
        self.grow_to_capacity(self.cap + capacity);
    }

    /// Bytes available to be read.
    pub fn remaining(&self) -> usize {
        self.write_offset - self.read_offset
    }

    /// Bytes of spare capacity available for writing.
    pub fn remaining_mut(&self) -> usize {
        self.cap - self.write_offset
    }

    /// The current write position.
    pub fn write_pos(&self) -> usize {
        self.write_offset
    }

    /// Pointer to the current read position. Valid for `remaining()` bytes.
    pub fn read_ptr(&self) -> *mut u8 {
        // Safety: both `ptr` and the resulting ptr are guaranteed to be within the allocated
        // object due to checks when compacting and mutating offsets. The offset will not overflow
        // `isize::MAX` as we never allocate more than that.
        unsafe { self.ptr.as_ptr().add(self.read_offset) }
    }

    /// Pointer to the current write position. Valid for `remaining_mut()` bytes.
    pub fn write_ptr(&self) -> *mut u8 {
        // Safety: both `ptr` and the resulting ptr are guaranteed to be within the allocated
        // object due to checks when compacting and mutating offsets. The offset will not overflow
        // `isize::MAX` as we never allocate more than that.
        unsafe { self.ptr.as_ptr().add(self.write_offset) }
    }

    /// Marks `amount` bytes as read, freeing them for eventual reclamation.
    pub fn mark_read(&mut self, amount: usize) {
        self.read_offset = self.write_offset.min(self.read_offset + amount);
        self.compact();
    }

    /// Marks `amount` bytes as written.
    pub fn mark_written(&mut self, amount: usize) {
        self.write_offset = self.cap.min(self.write_offset + amount);
    }

    /// Scans the readable region for `needle`, returning the end offset (exclusive) of the
    /// first match if present. Used to find the CRLFCRLF terminator of a handshake request.
    pub fn find(&self, needle: &[u8]) -> Option<usize> {
        let data: &[u8] = self.borrow();
        data.windows(needle.len())
            .position(|w| w == needle)
            .map(|pos| pos + needle.len())
    }

    fn grow(&mut self) {
        let new_cap = if self.cap == 0 {
            self.desired_capacity
        } else {
            2 * self.cap
        };
        self.grow_to_capacity(new_cap);
    }

    fn grow_to_capacity(&mut self, capacity: usize) {
        assert!(capacity <= isize::MAX as usize);

        let new_cap = capacity.next_power_of_two().min(isize::MAX as usize);
        let new_layout = Layout::array::<u8>(new_cap).unwrap();
        let new_ptr = if self.cap == 0 {
            // Safety: allocation failure is handled, layout is not zero-sized
            unsafe { alloc::alloc(new_layout) }
        } else {
            let old_layout = Layout::array::<u8>(self.cap).unwrap();
            let old_ptr = self.ptr.as_ptr();
            // Safety: allocation failure is handled, layout is not zero-sized
            unsafe { alloc::realloc(old_ptr, old_layout, new_layout.size()) }
        };

        self.ptr = match NonNull::new(new_ptr) {
            Some(p) => p,
            None => alloc::handle_alloc_error(new_layout),
        };
        self.cap = new_cap;
    }

    fn clear(&mut self) {
        self.read_offset = 0;
        self.write_offset = 0;

        if self.cap > self.desired_capacity {
            let layout = Layout::array::<u8>(self.cap).unwrap();
            // Safety: allocation failure is handled, layout is not zero-sized
            let new_ptr = unsafe { alloc::realloc(self.ptr.as_ptr(), layout, self.desired_capacity) };
            self.ptr = match NonNull::new(new_ptr) {
                Some(p) => p,
                None => alloc::handle_alloc_error(layout),
            };
            self.cap = self.desired_capacity;
        }
    }

    /// Reclaims unused space at the front of the buffer, only allocating when
    /// `self.cap > self.desired_capacity`.
    fn compact(&mut self) {
        if self.remaining() == 0 {
            self.clear();
            return;
        }

        if self.cap == self.desired_capacity {
            return;
        }

        if self.read_offset > self.desired_capacity {
            if self.remaining() < self.read_offset {
                // Safety: `read_ptr()` and `ptr` are valid for `remaining()` and are aligned to
                // u8. Copying to the beginning of the buffer will not overlap with `read_ptr` as
                // the read region is smaller than the offset.
                unsafe { copy_nonoverlapping(self.read_ptr(), self.ptr.as_ptr(), self.remaining()) }
            } else {
                // Safety: `read_ptr()` and `ptr` are valid for `remaining()` and are aligned to u8
                unsafe { copy(self.read_ptr(), self.ptr.as_ptr(), self.remaining()) }
            }

            self.write_offset = self.remaining();
            self.read_offset = 0;
        }
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if self.cap != 0 {
            let layout = Layout::array::<u8>(self.cap).unwrap();
            unsafe { alloc::dealloc(self.ptr.as_ptr(), layout) }
        }
    }
}

impl Borrow<[u8]> for Buffer {
    fn borrow(&self) -> &[u8] {
        // Safety: `read_ptr` points into a single allocated, contiguous, initialized region
        // aligned for `u8`, valid for `remaining()` bytes and never larger than `isize::MAX`.
        unsafe { std::slice::from_raw_parts(self.read_ptr(), self.remaining()) }
    }
}

impl BorrowMut<[u8]> for Buffer {
    fn borrow_mut(&mut self) -> &mut [u8] {
        // Safety: `write_ptr` points into a single allocated, contiguous region aligned for
        // `u8`, valid for `remaining_mut()` bytes and never larger than `isize::MAX`.
        unsafe { std::slice::from_raw_parts_mut(self.write_ptr(), self.remaining_mut()) }
    }
}

impl Deref for Buffer {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.borrow()
    }
}

impl DerefMut for Buffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.borrow_mut()
    }
}

impl Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.remaining_mut() < buf.len() {
            self.reserve(buf.len());
        }
        self.deref_mut()[0..buf.len()].clone_from_slice(buf);
        self.mark_written(buf.len());
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_buffer_is_empty() {
        let buf = Buffer::new(64);
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn write_then_read_round_trips() {
        let mut buf = Buffer::new(16);
        buf.write_all(b"hello").unwrap();
        assert_eq!(buf.remaining(), 5);
        let data: &[u8] = buf.borrow();
        assert_eq!(data, b"hello");
    }

    #[test]
    fn mark_read_advances_and_compacts() {
        let mut buf = Buffer::new(16);
        buf.write_all(b"hello world").unwrap();
        buf.mark_read(6);
        let data: &[u8] = buf.borrow();
        assert_eq!(data, b"world");
    }

    #[test]
    fn find_locates_terminator() {
        let mut buf = Buffer::new(64);
        buf.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\nextra").unwrap();
        let end = buf.find(b"\r\n\r\n").unwrap();
        let data: &[u8] = buf.borrow();
        assert_eq!(&data[..end], b"GET / HTTP/1.1\r\nHost: x\r\n\r\n");
    }

    #[test]
    fn grows_past_initial_capacity() {
        let mut buf = Buffer::new(4);
        let long = vec![b'a'; 1024];
        buf.write_all(&long).unwrap();
        assert_eq!(buf.remaining(), 1024);
    }
}
