// -*- mode: rust; -*-
//
// This file is part of `sherbet`.
// Copyright © 2021 Galois, Inc.
// See LICENSE for licensing information.

//! Encapsulates the communication channel between the two protocol parties.

use crate::Block;
use std::{
    cell::RefCell,
    io::{Read, Result, Write},
    rc::Rc,
};

/// A trait for managing I/O. `AbstractChannel`s are clonable, and provide
/// basic read/write capabilities for both common and `sherbet`-specific
/// types.
pub trait AbstractChannel {
    /// Read a slice of `u8`s from the channel.
    fn read_bytes(&mut self, bytes: &mut [u8]) -> Result<()>;
    /// Write a slice of `u8`s to the channel.
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()>;
    /// Flush the channel.
    fn flush(&mut self) -> Result<()>;
    /// Clone the channel.
    fn clone(&self) -> Self
    where
        Self: Sized;

    /// Read `nbytes` from the channel, and return it as a `Vec`.
    fn read_vec(&mut self, nbytes: usize) -> Result<Vec<u8>> {
        let mut data = vec![0; nbytes];
        self.read_bytes(&mut data)?;
        Ok(data)
    }

    /// Write a `u64` to the channel.
    #[inline(always)]
    fn write_u64(&mut self, s: u64) -> Result<()> {
        self.write_bytes(&s.to_le_bytes())
    }

    /// Read a `u64` from the channel.
    #[inline(always)]
    fn read_u64(&mut self) -> Result<u64> {
        let mut data = [0u8; 8];
        self.read_bytes(&mut data)?;
        Ok(u64::from_le_bytes(data))
    }

    /// Write a `usize` to the channel.
    #[inline(always)]
    fn write_usize(&mut self, s: usize) -> Result<()> {
        self.write_u64(s as u64)
    }

    /// Read a `usize` from the channel.
    #[inline(always)]
    fn read_usize(&mut self) -> Result<usize> {
        Ok(self.read_u64()? as usize)
    }

    /// Write a `Block` to the channel.
    #[inline(always)]
    fn write_block(&mut self, b: &Block) -> Result<()> {
        self.write_bytes(b.as_ref())
    }

    /// Read a `Block` from the channel.
    #[inline(always)]
    fn read_block(&mut self) -> Result<Block> {
        let mut v = Block::default();
        self.read_bytes(v.as_mut())?;
        Ok(v)
    }

    /// Write a slice of `Block`s to the channel as one byte run.
    #[inline(always)]
    fn write_blocks(&mut self, bs: &[Block]) -> Result<()> {
        let bytes =
            unsafe { std::slice::from_raw_parts(bs.as_ptr() as *const u8, bs.len() * 16) };
        self.write_bytes(bytes)
    }

    /// Read blocks from the channel into `bs`.
    #[inline(always)]
    fn read_blocks_into(&mut self, bs: &mut [Block]) -> Result<()> {
        let bytes = unsafe {
            std::slice::from_raw_parts_mut(bs.as_mut_ptr() as *mut u8, bs.len() * 16)
        };
        self.read_bytes(bytes)
    }

    /// Read `n` `Block`s from the channel.
    #[inline(always)]
    fn read_blocks(&mut self, n: usize) -> Result<Vec<Block>> {
        let mut out = vec![Block::default(); n];
        self.read_blocks_into(&mut out)?;
        Ok(out)
    }
}

/// A standard read/write channel that implements `AbstractChannel`.
pub struct Channel<R, W> {
    reader: Rc<RefCell<R>>,
    writer: Rc<RefCell<W>>,
}

impl<R: Read, W: Write> Channel<R, W> {
    /// Make a new `Channel` from a `reader` and a `writer`.
    pub fn new(reader: R, writer: W) -> Self {
        let reader = Rc::new(RefCell::new(reader));
        let writer = Rc::new(RefCell::new(writer));
        Self { reader, writer }
    }

    /// Return a reader object wrapped in `Rc<RefCell>`.
    pub fn reader(self) -> Rc<RefCell<R>> {
        self.reader
    }

    /// Return a writer object wrapped in `Rc<RefCell>`.
    pub fn writer(self) -> Rc<RefCell<W>> {
        self.writer
    }
}

impl<R: Read, W: Write> AbstractChannel for Channel<R, W> {
    #[inline(always)]
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.borrow_mut().write_all(bytes)
    }

    #[inline(always)]
    fn read_bytes(&mut self, bytes: &mut [u8]) -> Result<()> {
        self.reader.borrow_mut().read_exact(bytes)
    }

    #[inline(always)]
    fn flush(&mut self) -> Result<()> {
        self.writer.borrow_mut().flush()
    }

    #[inline(always)]
    fn clone(&self) -> Self {
        Self {
            reader: self.reader.clone(),
            writer: self.writer.clone(),
        }
    }
}

/// A channel that tracks the number of bytes read and written.
pub struct TrackChannel<C> {
    channel: C,
    nbytes_read: Rc<RefCell<usize>>,
    nbytes_written: Rc<RefCell<usize>>,
}

impl<C: AbstractChannel> TrackChannel<C> {
    /// Make a new `TrackChannel` wrapping `channel`.
    pub fn new(channel: C) -> Self {
        Self {
            channel,
            nbytes_read: Rc::new(RefCell::new(0)),
            nbytes_written: Rc::new(RefCell::new(0)),
        }
    }

    /// Return the number of bytes written to the channel.
    pub fn bytes_written(&self) -> usize {
        *self.nbytes_written.borrow()
    }

    /// Return the number of bytes read from the channel.
    pub fn bytes_read(&self) -> usize {
        *self.nbytes_read.borrow()
    }
}

impl<C: AbstractChannel> AbstractChannel for TrackChannel<C> {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        *self.nbytes_written.borrow_mut() += bytes.len();
        self.channel.write_bytes(bytes)
    }

    fn read_bytes(&mut self, bytes: &mut [u8]) -> Result<()> {
        *self.nbytes_read.borrow_mut() += bytes.len();
        self.channel.read_bytes(bytes)
    }

    fn flush(&mut self) -> Result<()> {
        self.channel.flush()
    }

    fn clone(&self) -> Self {
        Self {
            channel: self.channel.clone(),
            nbytes_read: self.nbytes_read.clone(),
            nbytes_written: self.nbytes_written.clone(),
        }
    }
}
