// Copyright (c) The Chainyard Contributors
// SPDX-License-Identifier: Apache-2.0

mod cidr_test;
