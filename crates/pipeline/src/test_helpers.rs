//! Stub capabilities for pipeline tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tpforge_core::company::{Company, EntityType, Jurisdiction};
use tpforge_core::error::{ProviderError, RetrievalError, TemplateError};
use tpforge_core::message::{Message, Role};
use tpforge_core::provider::{Provider, ProviderRequest, ProviderResponse};
use tpforge_core::retrieval::{RegulatoryFragment, RetrievalQuery, Retriever};
use tpforge_core::section::SectionName;
use tpforge_core::transaction::{FunctionalProfile, RiskLevel, Transaction, TransactionType};

use crate::state::PipelineState;
use crate::template::TemplateStore;

fn text_response(text: impl Into<String>) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: None,
        model: "mock".into(),
    }
}

fn user_prompt(request: &ProviderRequest) -> String {
    request
        .messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.clone())
        .unwrap_or_default()
}

/// Returns scripted texts in order, repeating the last one once exhausted.
pub struct ScriptedProvider {
    texts: Vec<String>,
    calls: AtomicUsize,
    last_request: Mutex<Option<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(texts: &[&str]) -> Self {
        Self {
            texts: texts.iter().map(|t| t.to_string()).collect(),
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn repeating(text: &str) -> Self {
        Self::new(&[text])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<ProviderRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request);
        let text = self
            .texts
            .get(n)
            .or_else(|| self.texts.last())
            .cloned()
            .unwrap_or_default();
        Ok(text_response(text))
    }
}

/// Answers with the prompt it was given.
pub struct EchoProvider;

#[async_trait]
impl Provider for EchoProvider {
    fn name(&self) -> &str {
        "echo"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Ok(text_response(user_prompt(&request)))
    }
}

/// Fails on the listed 1-based call numbers and answers
/// `"generated content #{n}"` otherwise.
pub struct FailingOnCallProvider {
    fail_on: Vec<usize>,
    calls: AtomicUsize,
}

impl FailingOnCallProvider {
    pub fn new(fail_on: &[usize]) -> Self {
        Self {
            fail_on: fail_on.to_vec(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for FailingOnCallProvider {
    fn name(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on.contains(&n) {
            return Err(ProviderError::ApiError {
                status_code: 503,
                message: format!("backend unavailable on call {n}"),
            });
        }
        Ok(text_response(format!("generated content #{n}")))
    }
}

/// Sleeps before answering.
pub struct SlowProvider {
    delay: Duration,
}

impl SlowProvider {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Provider for SlowProvider {
    fn name(&self) -> &str {
        "slow"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        tokio::time::sleep(self.delay).await;
        Ok(text_response("late"))
    }
}

/// Returns the same fragments for every query and remembers the last query.
pub struct StaticRetriever {
    fragments: Vec<RegulatoryFragment>,
    last_query: Mutex<Option<RetrievalQuery>>,
}

impl StaticRetriever {
    pub fn new(fragments: Vec<RegulatoryFragment>) -> Self {
        Self {
            fragments,
            last_query: Mutex::new(None),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn with_sources(ids: &[&str]) -> Self {
        Self::new(
            ids.iter()
                .map(|id| RegulatoryFragment {
                    text: format!("Regulatory text from {id}."),
                    source_id: id.to_string(),
                    score: 1.0,
                })
                .collect(),
        )
    }

    pub fn last_query(&self) -> Option<RetrievalQuery> {
        self.last_query.lock().unwrap().clone()
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    fn name(&self) -> &str {
        "static"
    }

    async fn retrieve(&self, query: &RetrievalQuery) -> Result<Vec<RegulatoryFragment>, RetrievalError> {
        *self.last_query.lock().unwrap() = Some(query.clone());
        Ok(self.fragments.iter().take(query.top_k).cloned().collect())
    }
}

pub struct FailingRetriever;

#[async_trait]
impl Retriever for FailingRetriever {
    fn name(&self) -> &str {
        "failing"
    }

    async fn retrieve(&self, _query: &RetrievalQuery) -> Result<Vec<RegulatoryFragment>, RetrievalError> {
        Err(RetrievalError::Unavailable("index offline".into()))
    }
}

/// In-memory templates; sections without an entry are `NotFound`.
pub struct StaticTemplates {
    templates: HashMap<SectionName, String>,
}

impl StaticTemplates {
    pub fn new(entries: &[(SectionName, &str)]) -> Self {
        Self {
            templates: entries.iter().map(|(n, t)| (*n, t.to_string())).collect(),
        }
    }
}

impl TemplateStore for StaticTemplates {
    fn name(&self) -> &str {
        "static"
    }

    fn load(&self, section: SectionName) -> Result<String, TemplateError> {
        self.templates
            .get(&section)
            .cloned()
            .ok_or_else(|| TemplateError::NotFound {
                name: section.as_str().to_string(),
            })
    }
}

pub fn sample_company() -> Company {
    Company::draft("Acme IN", Jurisdiction::India, "AAACA1234A", EntityType::ServiceProvider)
}

pub fn sample_transaction() -> Transaction {
    Transaction::draft(
        TransactionType::Services,
        "Acme US Inc",
        Jurisdiction::US,
        FunctionalProfile {
            functions: vec!["dev".into()],
            assets: vec!["workforce".into()],
            risks: vec!["low".into()],
            risk_level: RiskLevel::Low,
        },
    )
}

pub fn sample_state() -> PipelineState {
    PipelineState::new(sample_company(), vec![sample_transaction()], "2023-24")
}
