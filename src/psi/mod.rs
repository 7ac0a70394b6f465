// -*- mode: rust; -*-
//
// This file is part of `sherbet`.
// Copyright © 2021 Galois, Inc.
// See LICENSE for licensing information.

pub mod rs;

/// Private set intersection sender.
pub type Sender<V> = rs::Sender<V>;
/// Private set intersection receiver.
pub type Receiver<V> = rs::Receiver<V>;
