// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # VEGA Ledger — Core Library
//!
//! This is the beating heart of VEGA: a custodial balance ledger for the
//! payments people actually make — rent, split dinners — not a settlement
//! layer fantasy.
//!
//! VEGA takes a pragmatic stance: balances are unsigned integers in minor
//! units (because floating-point money is a felony), a transfer is one
//! storage transaction (because "eventually consistent" is not a phrase
//! you want near your paycheck), and the journal is append-only (because
//! money that moved should stay moved).
//!
//! ## Architecture
//!
//! The ledger is split into modules that mirror the actual concerns of a
//! wallet backend:
//!
//! - **account** — Balance-bearing accounts and the one way to mutate them.
//! - **journal** — The append-only record of every committed transfer.
//! - **transfer** — The engine: validate, commit atomically, retry contention.
//! - **recurring** — Standing instructions and the sweep that runs them.
//! - **savings** — Goals. Bookkeeping, not money.
//! - **storage** — Persistent storage over sled.
//! - **config** — Ledger constants and limits.
//!
//! ## Design Philosophy
//!
//! 1. Correctness over performance (but we're still fast).
//! 2. Partial transfers do not exist. Both sides move or neither does.
//! 3. Every refusal is a typed error. "Something went wrong" is not a type.
//! 4. If it touches money, it has tests. Plural.

pub mod account;
pub mod config;
pub mod journal;
pub mod recurring;
pub mod savings;
pub mod storage;
pub mod transfer;
