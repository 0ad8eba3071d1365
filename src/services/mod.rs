// src/services/mod.rs

//! Core game logic. Each service receives its storage handle, clock and
//! random source at construction.

pub mod accounts;
pub mod aggregates;
pub mod ledger;
pub mod question_bank;
pub mod rankings;
pub mod scoring;
pub mod session;

use std::sync::Arc;

use rand::rngs::StdRng;
use tokio::sync::Mutex;

use crate::{store::QuizStore, utils::clock::Clock};

pub type SharedStore = Arc<dyn QuizStore>;
pub type SharedClock = Arc<dyn Clock>;
pub type SharedRng = Arc<Mutex<StdRng>>;
