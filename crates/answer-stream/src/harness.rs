use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::HarnessError;
use crate::provider::{AnswerParams, AnswerProvider, ProviderId};
use crate::stream::AnswerStream;

/// Registry of pluggable providers.
///
/// Cheap to clone; clones share the same providers. Every call made through
/// it is independent of every other call.
#[derive(Clone)]
pub struct Harness {
    providers: Arc<HashMap<ProviderId, Arc<dyn AnswerProvider>>>,
}

impl Harness {
    /// Starts a builder for registering providers.
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }

    /// Returns the provider registered under `id`.
    pub fn provider(&self, id: &ProviderId) -> Option<Arc<dyn AnswerProvider>> {
        self.providers.get(id).cloned()
    }

    /// Ids of all registered providers, in no particular order.
    pub fn provider_ids(&self) -> impl Iterator<Item = &ProviderId> {
        self.providers.keys()
    }

    /// Starts a call on the provider registered under `id`.
    pub async fn generate_answer(
        &self,
        id: &ProviderId,
        params: AnswerParams,
    ) -> Result<AnswerStream, HarnessError> {
        let provider = self
            .provider(id)
            .ok_or_else(|| HarnessError::ProviderNotFound {
                provider: id.clone(),
            })?;
        Ok(provider.generate_answer(params).await)
    }
}

/// Builder used to register providers before creating a `Harness`.
#[derive(Default)]
pub struct HarnessBuilder {
    providers: Vec<Arc<dyn AnswerProvider>>,
}

impl HarnessBuilder {
    /// Registers a provider. Ids must be unique.
    pub fn register_provider(mut self, provider: Arc<dyn AnswerProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Builds the harness and rejects duplicate provider ids.
    pub fn build(self) -> Result<Harness, HarnessError> {
        let mut map: HashMap<ProviderId, Arc<dyn AnswerProvider>> = HashMap::new();
        for provider in self.providers {
            let id = provider.id();
            if map.contains_key(&id) {
                return Err(HarnessError::Config(format!(
                    "duplicate provider registration: {id}"
                )));
            }
            map.insert(id, provider);
        }
        Ok(Harness {
            providers: Arc::new(map),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::AnswerEvent;
    use futures::StreamExt as _;

    struct EchoProvider;

    #[async_trait::async_trait]
    impl AnswerProvider for EchoProvider {
        fn id(&self) -> ProviderId {
            ProviderId::new("echo")
        }

        async fn generate_answer(&self, params: AnswerParams) -> AnswerStream {
            let events = vec![
                AnswerEvent::Answer {
                    text: params.prompt,
                    message_id: None,
                    conversation_id: None,
                },
                AnswerEvent::Done,
            ];
            AnswerStream::new(uuid::Uuid::new_v4(), futures::stream::iter(events))
        }
    }

    #[test]
    fn build_rejects_duplicate_provider_ids() {
        let result = Harness::builder()
            .register_provider(Arc::new(EchoProvider))
            .register_provider(Arc::new(EchoProvider))
            .build();
        assert!(
            matches!(result, Err(HarnessError::Config(message)) if message.contains("duplicate provider"))
        );
    }

    #[tokio::test]
    async fn generate_answer_dispatches_to_registered_provider() {
        let harness = Harness::builder()
            .register_provider(Arc::new(EchoProvider))
            .build()
            .expect("harness");
        assert_eq!(harness.provider_ids().count(), 1);

        let events: Vec<_> = harness
            .generate_answer(&ProviderId::new("echo"), AnswerParams::new("ping"))
            .await
            .expect("registered")
            .collect()
            .await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], AnswerEvent::Done);
    }

    #[tokio::test]
    async fn unknown_provider_is_rejected() {
        let harness = Harness::builder().build().expect("harness");
        let result = harness
            .generate_answer(&ProviderId::new("missing"), AnswerParams::new("ping"))
            .await;
        assert!(matches!(result, Err(HarnessError::ProviderNotFound { .. })));
    }
}
