//! The section node: produces one section's content or a section-local error.

use std::sync::Arc;
use std::time::Duration;
use tpforge_core::error::{ProviderError, TemplateError};
use tpforge_core::provider::{Provider, ProviderRequest};
use tpforge_core::retrieval::{RegulatoryFragment, RetrievalQuery, Retriever};
use tpforge_core::section::SectionName;
use tracing::{debug, info, warn};

use crate::citations;
use crate::context::{common_variables, type_terms};
use crate::section::{QueryInputs, SectionKind, kind};
use crate::state::{PipelineState, SectionLookup, Unavailable};
use crate::template::{TemplateStore, render};

/// A section's generated content.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionOutput {
    pub content: String,
    pub citations: Vec<String>,
    /// Number of fragments retrieved for grounding
    pub fragments: usize,
}

/// Failure scoped to one section. Never aborts a run.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SectionError {
    #[error("missing prerequisite: {dependency} {reason}")]
    PrerequisiteMissing {
        dependency: SectionName,
        reason: Unavailable,
    },

    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    #[error("generation failed: {0}")]
    Generation(#[from] ProviderError),

    #[error("generation returned no content")]
    EmptyOutput,
}

/// Model parameters applied to every section request.
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub system_prompt: Option<String>,
    pub timeout: Duration,
    pub top_k: usize,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: "llama3.2:latest".into(),
            temperature: 0.3,
            max_tokens: Some(2048),
            system_prompt: None,
            timeout: Duration::from_secs(300),
            top_k: 10,
        }
    }
}

/// Executes section nodes against shared, reentrant capabilities.
pub struct SectionRunner {
    provider: Arc<dyn Provider>,
    retriever: Arc<dyn Retriever>,
    templates: Arc<dyn TemplateStore>,
    settings: GenerationSettings,
}

impl SectionRunner {
    pub fn new(
        provider: Arc<dyn Provider>,
        retriever: Arc<dyn Retriever>,
        templates: Arc<dyn TemplateStore>,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            provider,
            retriever,
            templates,
            settings,
        }
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    pub fn retriever(&self) -> &Arc<dyn Retriever> {
        &self.retriever
    }

    pub fn templates(&self) -> &Arc<dyn TemplateStore> {
        &self.templates
    }

    /// Generate `name` from `state`.
    ///
    /// Dependencies are checked before any capability is called. Retrieval
    /// errors degrade to an empty context; everything else is a
    /// [`SectionError`].
    pub async fn execute(
        &self,
        name: SectionName,
        state: &PipelineState,
    ) -> Result<SectionOutput, SectionError> {
        let kind = kind(name);

        let mut dependency_vars = Vec::with_capacity(kind.depends_on.len());
        for &dependency in kind.depends_on {
            match state.prior_content(name, dependency) {
                SectionLookup::Available(content) => {
                    dependency_vars.push((SectionKind::dependency_var(dependency), content.to_string()))
                }
                SectionLookup::Unavailable(reason) => {
                    return Err(SectionError::PrerequisiteMissing { dependency, reason });
                }
            }
        }

        let fragments = self.retrieve(kind, state).await;

        let mut vars = common_variables(state, &fragments);
        vars.extend(dependency_vars);
        vars.extend(
            (kind.extra_vars)(state.subject())
                .into_iter()
                .map(|(k, v)| (k.to_string(), v)),
        );

        let template = self.templates.load(name)?;
        let prompt = render(name.as_str(), &template, &vars)?;
        debug!(section = %name, prompt_chars = prompt.len(), "Prompt rendered");

        let content = self.generate(name, prompt).await?;
        let citations = citations::extract(&content, &fragments);

        info!(
            section = %name,
            chars = content.len(),
            citations = citations.len(),
            "Section generated"
        );
        Ok(SectionOutput {
            content,
            citations,
            fragments: fragments.len(),
        })
    }

    async fn retrieve(&self, kind: &SectionKind, state: &PipelineState) -> Vec<RegulatoryFragment> {
        let jurisdiction = state.subject().jurisdiction.to_string();
        let terms = type_terms(state.items());
        let types = terms.join(", ");
        let query = RetrievalQuery {
            text: kind.query_for(&QueryInputs {
                jurisdiction: &jurisdiction,
                types: &types,
            }),
            jurisdiction,
            type_terms: terms,
            top_k: self.settings.top_k,
        };
        debug!(section = %kind.name, query = %query.text, "Retrieving regulatory context");

        match self.retriever.retrieve(&query).await {
            Ok(fragments) => {
                debug!(section = %kind.name, fragments = fragments.len(), "Retrieval complete");
                fragments
            }
            Err(e) => {
                warn!(
                    section = %kind.name,
                    retriever = self.retriever.name(),
                    error = %e,
                    "Retrieval failed, continuing without regulatory context"
                );
                Vec::new()
            }
        }
    }

    async fn generate(&self, name: SectionName, prompt: String) -> Result<String, SectionError> {
        let mut request = ProviderRequest::prompt(
            &self.settings.model,
            self.settings.system_prompt.as_deref(),
            prompt,
        )
        .with_temperature(self.settings.temperature);
        if let Some(max_tokens) = self.settings.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }

        debug!(
            section = %name,
            provider = self.provider.name(),
            model = %self.settings.model,
            "Calling generation provider"
        );
        let response = tokio::time::timeout(self.settings.timeout, self.provider.complete(request))
            .await
            .map_err(|_| {
                ProviderError::Timeout(format!(
                    "no response within {}s",
                    self.settings.timeout.as_secs()
                ))
            })??;

        let text = response.message.content.trim();
        if text.is_empty() {
            return Err(SectionError::EmptyOutput);
        }
        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NO_CONTEXT_NOTICE;
    use crate::template::BuiltinTemplates;
    use crate::test_helpers::{
        EchoProvider, FailingOnCallProvider, FailingRetriever, ScriptedProvider, SlowProvider,
        StaticRetriever, StaticTemplates, sample_state,
    };
    use tpforge_core::section::SectionStatus;

    fn runner(provider: Arc<dyn Provider>, retriever: Arc<dyn Retriever>) -> SectionRunner {
        SectionRunner::new(
            provider,
            retriever,
            Arc::new(BuiltinTemplates),
            GenerationSettings::default(),
        )
    }

    #[tokio::test]
    async fn generates_with_citations() {
        let retriever = Arc::new(StaticRetriever::with_sources(&["india_rule_10b", "oecd_ch1"]));
        let provider = Arc::new(ScriptedProvider::repeating("Per [2], the summary."));
        let out = runner(provider, retriever.clone())
            .execute(SectionName::ExecutiveSummary, &sample_state())
            .await
            .unwrap();
        assert_eq!(out.content, "Per [2], the summary.");
        assert_eq!(out.citations, vec!["oecd_ch1"]);
        assert_eq!(out.fragments, 2);

        let query = retriever.last_query().unwrap();
        assert_eq!(
            query.text,
            "executive summary requirements for transfer pricing documentation in India"
        );
        assert_eq!(query.jurisdiction, "India");
        assert_eq!(query.type_terms, vec!["services"]);
        assert_eq!(query.top_k, 10);
    }

    #[tokio::test]
    async fn empty_retrieval_still_generates() {
        let provider = Arc::new(EchoProvider);
        let out = runner(provider, Arc::new(StaticRetriever::empty()))
            .execute(SectionName::RelatedParties, &sample_state())
            .await
            .unwrap();
        assert!(out.citations.is_empty());
        assert!(out.content.contains(NO_CONTEXT_NOTICE));
    }

    #[tokio::test]
    async fn retrieval_error_degrades_to_empty_context() {
        let out = runner(Arc::new(EchoProvider), Arc::new(FailingRetriever))
            .execute(SectionName::Benchmarking, &sample_state())
            .await
            .unwrap();
        assert!(out.citations.is_empty());
        assert!(out.content.contains("Tested party: Acme IN"));
    }

    #[tokio::test]
    async fn dependent_section_receives_prior_content() {
        let mut state = sample_state();
        state.sections.set(
            SectionName::FunctionalAnalysis,
            tpforge_core::section::SectionResult::generated("X-FAR-PROFILE", vec![]),
        );
        state.completed.push(SectionName::FunctionalAnalysis);

        let out = runner(Arc::new(EchoProvider), Arc::new(StaticRetriever::empty()))
            .execute(SectionName::ComparabilityAnalysis, &state)
            .await
            .unwrap();
        assert!(out.content.contains("FUNCTIONAL ANALYSIS (already drafted):\nX-FAR-PROFILE"));
        assert!(out.content.contains("suitable for the TNMM"));
    }

    #[tokio::test]
    async fn missing_dependency_fails_before_calling_capabilities() {
        let provider = Arc::new(ScriptedProvider::repeating("unused"));
        let retriever = Arc::new(StaticRetriever::empty());
        let err = runner(provider.clone(), retriever.clone())
            .execute(SectionName::MethodSelection, &sample_state())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SectionError::PrerequisiteMissing {
                dependency: SectionName::FunctionalAnalysis,
                reason: Unavailable::NotGenerated
            }
        ));
        assert_eq!(provider.calls(), 0);
        assert!(retriever.last_query().is_none());
        assert_eq!(
            err.to_string(),
            "missing prerequisite: functional_analysis has not been generated"
        );
    }

    #[tokio::test]
    async fn provider_error_is_section_error() {
        let provider = Arc::new(FailingOnCallProvider::new(&[1]));
        let err = runner(provider, Arc::new(StaticRetriever::empty()))
            .execute(SectionName::ExecutiveSummary, &sample_state())
            .await
            .unwrap_err();
        assert!(matches!(err, SectionError::Generation(_)));
    }

    #[tokio::test]
    async fn whitespace_output_is_a_failure() {
        let provider = Arc::new(ScriptedProvider::repeating("  \n\t "));
        let err = runner(provider, Arc::new(StaticRetriever::empty()))
            .execute(SectionName::ExecutiveSummary, &sample_state())
            .await
            .unwrap_err();
        assert!(matches!(err, SectionError::EmptyOutput));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_provider_times_out() {
        let settings = GenerationSettings {
            timeout: Duration::from_secs(5),
            ..GenerationSettings::default()
        };
        let runner = SectionRunner::new(
            Arc::new(SlowProvider::new(Duration::from_secs(60))),
            Arc::new(StaticRetriever::empty()),
            Arc::new(BuiltinTemplates),
            settings,
        );
        let err = runner
            .execute(SectionName::ExecutiveSummary, &sample_state())
            .await
            .unwrap_err();
        assert!(matches!(err, SectionError::Generation(ProviderError::Timeout(_))));
        assert!(err.to_string().contains("5s"));
    }

    #[tokio::test]
    async fn template_problems_are_section_errors() {
        let missing = SectionRunner::new(
            Arc::new(EchoProvider),
            Arc::new(StaticRetriever::empty()),
            Arc::new(StaticTemplates::new(&[])),
            GenerationSettings::default(),
        );
        let err = missing
            .execute(SectionName::ExecutiveSummary, &sample_state())
            .await
            .unwrap_err();
        assert!(matches!(err, SectionError::Template(TemplateError::NotFound { .. })));

        let unresolved = SectionRunner::new(
            Arc::new(EchoProvider),
            Arc::new(StaticRetriever::empty()),
            Arc::new(StaticTemplates::new(&[(SectionName::ExecutiveSummary, "{no_such_var}")])),
            GenerationSettings::default(),
        );
        let err = unresolved
            .execute(SectionName::ExecutiveSummary, &sample_state())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SectionError::Template(TemplateError::UnresolvedVariable { .. })
        ));
    }

    #[tokio::test]
    async fn request_carries_settings() {
        let provider = Arc::new(ScriptedProvider::repeating("ok"));
        let settings = GenerationSettings {
            model: "gpt-4o-mini".into(),
            temperature: 0.1,
            max_tokens: Some(900),
            system_prompt: Some("You draft TP policies.".into()),
            ..GenerationSettings::default()
        };
        SectionRunner::new(
            provider.clone(),
            Arc::new(StaticRetriever::empty()),
            Arc::new(BuiltinTemplates),
            settings,
        )
        .execute(SectionName::ExecutiveSummary, &sample_state())
        .await
        .unwrap();

        let request = provider.last_request().unwrap();
        assert_eq!(request.model, "gpt-4o-mini");
        assert_eq!(request.max_tokens, Some(900));
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].content, "You draft TP policies.");
        assert!(request.messages[1].content.contains("Acme IN"));
        assert_eq!(
            sample_state().sections().get(SectionName::ExecutiveSummary).status,
            SectionStatus::Pending
        );
    }
}
