// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Integration Tests
//!
//! Scenarios spanning the scheduler, the sleep queue and the blocking
//! primitives, run on the hosted platform with real kernel threads.

mod syscall_tests;
