// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

mod ecn;

pub use ecn::ExplicitCongestionNotification;
