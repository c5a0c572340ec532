// Copyright 2026 The Palaver Project
// SPDX-License-Identifier: Apache-2.0

pub mod auth;
pub mod budget;
pub mod client;
pub mod message;
pub mod stream;
