#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use clap::Parser;
use lectern::application::codes::{CodeError, CodeSender};
use lectern::config::{self, CliArgs, Settings};
use lectern::infra::bootstrap::{Backends, PrimaryStore, Services};
use lectern::infra::memory::MemoryRepositories;

/// Services over in-process backends with the shipped defaults.
pub struct Harness {
    pub settings: Settings,
    pub backends: Backends,
    pub services: Services,
}

impl Harness {
    pub fn new() -> Self {
        let backends = Backends::in_memory();
        let settings = memory_settings();
        let services = Services::build(&backends, &settings).expect("services build");
        Self {
            settings,
            backends,
            services,
        }
    }

    pub fn store(&self) -> Arc<MemoryRepositories> {
        match &self.backends.store {
            PrimaryStore::Memory(repos) => repos.clone(),
            PrimaryStore::Postgres(_) => panic!("harness always uses the in-memory store"),
        }
    }

    pub async fn settle(&self) {
        self.services.articles.write_back().flush().await;
        self.services.interactions.write_back().flush().await;
    }
}

pub fn memory_settings() -> Settings {
    let args = CliArgs::parse_from(["lectern", "health", "--store-backend", "memory"]);
    config::load(&args).expect("default settings load")
}

/// Keeps every delivered code for inspection.
#[derive(Default)]
pub struct Outbox {
    sent: Mutex<Vec<(String, String)>>,
}

impl Outbox {
    pub fn last_code(&self) -> Option<String> {
        self.sent
            .lock()
            .expect("outbox lock")
            .last()
            .map(|(_, code)| code.clone())
    }

    pub fn delivered(&self) -> usize {
        self.sent.lock().expect("outbox lock").len()
    }
}

#[async_trait]
impl CodeSender for Outbox {
    async fn send(&self, _biz: &str, recipient: &str, code: &str) -> Result<(), CodeError> {
        self.sent
            .lock()
            .expect("outbox lock")
            .push((recipient.to_string(), code.to_string()));
        Ok(())
    }
}
