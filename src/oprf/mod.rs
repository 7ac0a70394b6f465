// -*- mode: rust; -*-
//
// This file is part of `sherbet`.
// Copyright © 2021 Galois, Inc.
// See LICENSE for licensing information.

//! Oblivious PRF instantiations.

pub mod rs;

/// VOLE + OKVS oblivious PRF sender.
pub type RsOprfSender<V> = rs::Sender<V>;
/// VOLE + OKVS oblivious PRF receiver.
pub type RsOprfReceiver<V> = rs::Receiver<V>;
