// src/state.rs

use std::sync::Arc;

use axum::extract::FromRef;
use rand::{SeedableRng, rngs::StdRng};
use tokio::sync::Mutex;

use crate::{
    config::Config,
    services::{
        SharedClock, SharedRng, SharedStore,
        accounts::{Accounts, TokenSettings},
        aggregates::AggregatePropagator,
        ledger::JokerLedger,
        question_bank::QuestionBank,
        rankings::Rankings,
        scoring::ScoringEngine,
        session::SessionBuilder,
    },
    utils::clock::SystemClock,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: SharedStore,
    pub accounts: Accounts,
    pub questions: QuestionBank,
    pub ledger: JokerLedger,
    pub sessions: SessionBuilder,
    pub scoring: ScoringEngine,
    pub rankings: Rankings,
    pub aggregates: AggregatePropagator,
}

impl AppState {
    /// Wires every service over `store` with the system clock and an OS-seeded RNG.
    pub fn new(store: SharedStore, config: Config) -> Self {
        let rng = Arc::new(Mutex::new(StdRng::from_os_rng()));
        Self::with_parts(store, config, Arc::new(SystemClock), rng)
    }

    pub fn with_parts(
        store: SharedStore,
        config: Config,
        clock: SharedClock,
        rng: SharedRng,
    ) -> Self {
        let rules = config.rules.clone();
        let aggregates = AggregatePropagator::new(store.clone());
        let ledger = JokerLedger::new(store.clone(), clock.clone(), rng.clone(), rules.clone());
        let sessions = SessionBuilder::new(
            store.clone(),
            clock.clone(),
            rng,
            rules.clone(),
            ledger.clone(),
        );
        let scoring = ScoringEngine::new(
            store.clone(),
            clock.clone(),
            rules,
            ledger.clone(),
            aggregates.clone(),
        );
        let accounts = Accounts::new(
            store.clone(),
            clock,
            aggregates.clone(),
            TokenSettings {
                secret: config.jwt_secret.clone(),
                expiration_seconds: config.jwt_expiration,
            },
        );

        Self {
            questions: QuestionBank::new(store.clone(), aggregates.clone()),
            rankings: Rankings::new(store.clone()),
            config,
            store,
            accounts,
            ledger,
            sessions,
            scoring,
            aggregates,
        }
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for SharedStore {
    fn from_ref(state: &AppState) -> Self {
        state.store.clone()
    }
}

impl FromRef<AppState> for Accounts {
    fn from_ref(state: &AppState) -> Self {
        state.accounts.clone()
    }
}

impl FromRef<AppState> for QuestionBank {
    fn from_ref(state: &AppState) -> Self {
        state.questions.clone()
    }
}

impl FromRef<AppState> for JokerLedger {
    fn from_ref(state: &AppState) -> Self {
        state.ledger.clone()
    }
}

impl FromRef<AppState> for SessionBuilder {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}

impl FromRef<AppState> for ScoringEngine {
    fn from_ref(state: &AppState) -> Self {
        state.scoring.clone()
    }
}

impl FromRef<AppState> for Rankings {
    fn from_ref(state: &AppState) -> Self {
        state.rankings.clone()
    }
}

impl FromRef<AppState> for AggregatePropagator {
    fn from_ref(state: &AppState) -> Self {
        state.aggregates.clone()
    }
}
