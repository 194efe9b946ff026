// SPDX-License-Identifier: Apache-2.0

pub mod log_collector;
pub mod cron;
pub mod run_store;
pub mod collaborators;
