use async_nats::jetstream::{self, consumer::AckPolicy, consumer::pull, stream};
use futures::StreamExt as _;

use crate::relay::{BrokerError, Delivery, MessageSource};

#[derive(Debug, Clone)]
pub struct JetStreamSettings {
    pub url: String,
    pub stream: String,
    pub subject: String,
    /// Durable consumer name; instances sharing it split the stream between them.
    pub consumer_group: String,
}

/// Durable JetStream pull consumer over the outbox subject.
pub struct JetStreamSource {
    messages: pull::Stream,
}

impl JetStreamSource {
    pub async fn connect(settings: &JetStreamSettings) -> Result<Self, BrokerError> {
        let client = async_nats::connect(&settings.url)
            .await
            .map_err(|e| BrokerError::Connect(e.to_string()))?;
        let context = jetstream::new(client);

        let stream = context
            .get_or_create_stream(stream::Config {
                name: settings.stream.clone(),
                subjects: vec![settings.subject.clone()],
                ..Default::default()
            })
            .await
            .map_err(|e| BrokerError::Setup(format!("stream {}: {e}", settings.stream)))?;

        let consumer = stream
            .get_or_create_consumer(
                &settings.consumer_group,
                pull::Config {
                    durable_name: Some(settings.consumer_group.clone()),
                    filter_subject: settings.subject.clone(),
                    ack_policy: AckPolicy::Explicit,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| {
                BrokerError::Setup(format!("consumer {}: {e}", settings.consumer_group))
            })?;

        let messages = consumer
            .messages()
            .await
            .map_err(|e| BrokerError::Setup(format!("subscribe: {e}")))?;

        tracing::info!(
            stream = %settings.stream,
            subject = %settings.subject,
            consumer = %settings.consumer_group,
            "jetstream consumer ready"
        );
        Ok(Self { messages })
    }
}

impl MessageSource for JetStreamSource {
    type Ack = jetstream::Message;

    async fn fetch(&mut self) -> Result<Option<Delivery<Self::Ack>>, BrokerError> {
        match self.messages.next().await {
            Some(Ok(message)) => Ok(Some(Delivery {
                body: message.payload.to_vec(),
                ack: message,
            })),
            Some(Err(e)) => Err(BrokerError::Fetch(e.to_string())),
            None => Ok(None),
        }
    }

    async fn commit(&mut self, ack: Self::Ack) -> Result<(), BrokerError> {
        ack.ack()
            .await
            .map_err(|e| BrokerError::Commit(e.to_string()))
    }
}
