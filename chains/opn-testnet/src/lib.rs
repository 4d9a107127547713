//! OPN testnet batch tools: on-chain reward claim and HTTP faucet requests,
//! both driven by the `core-logic` batch runner.

pub mod captcha;
pub mod claim;
pub mod client;
pub mod config;
pub mod faucet;
pub mod preflight;
pub mod wallets;
