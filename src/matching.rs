//! Publisher/subscriber scoring
//!
//! The framework asks every transport admin to score a publisher or
//! subscriber request and picks the highest scoring admin. A request naming
//! this admin explicitly always wins; a request naming another admin, or one
//! for which no serializer is available, scores zero.

use crate::endpoint::{self, Properties, ENDPOINT_ADMIN_TYPE, ENDPOINT_SERIALIZER, QOS};
use crate::protocol::{
    DEFAULT_QOS_CONTROL_SCORE, DEFAULT_QOS_SAMPLE_SCORE, DEFAULT_SCORE, FULL_MATCH_SCORE,
    NO_MATCH_SCORE, QOS_CONTROL, QOS_SAMPLE,
};
use crate::serializer::SerializerRegistry;

/// Id of the component asking for a publisher or offering a subscriber
pub type ComponentId = u64;

/// Configurable weights
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchScores {
    pub qos_sample: f64,
    pub qos_control: f64,
    pub default: f64,
}

impl Default for MatchScores {
    fn default() -> Self {
        Self {
            qos_sample: DEFAULT_QOS_SAMPLE_SCORE,
            qos_control: DEFAULT_QOS_CONTROL_SCORE,
            default: DEFAULT_SCORE,
        }
    }
}

/// Quality-of-service class of a topic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qos {
    Sample,
    Control,
    Unspecified,
}

impl Qos {
    pub fn from_properties(props: &Properties) -> Self {
        match props.get(QOS) {
            Some(QOS_SAMPLE) => Qos::Sample,
            Some(QOS_CONTROL) => Qos::Control,
            _ => Qos::Unspecified,
        }
    }
}

/// Per-component topic configuration lookup
///
/// Components may ship topic properties (qos, serializer, admin, static
/// connect urls) for the topics they publish or subscribe to.
pub trait TopicPropertiesProvider: Send + Sync {
    fn topic_properties(
        &self,
        component: ComponentId,
        scope: Option<&str>,
        topic: &str,
        publisher: bool,
    ) -> Option<Properties>;
}

/// Provider that never has topic properties
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTopicProperties;

impl TopicPropertiesProvider for NoTopicProperties {
    fn topic_properties(&self, _: ComponentId, _: Option<&str>, _: &str, _: bool) -> Option<Properties> {
        None
    }
}

/// Result of scoring one request
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub score: f64,
    pub topic_properties: Properties,
    /// Serialization type the admin would use
    pub serializer: Option<String>,
}

/// Score a request against this admin
///
/// `request` carries the topic, scope and any explicitly requested admin,
/// serializer or qos. Provider properties override request properties.
pub fn score(
    component: ComponentId,
    request: &Properties,
    publisher: bool,
    admin_type: &str,
    scores: &MatchScores,
    registry: &SerializerRegistry,
    provider: &dyn TopicPropertiesProvider,
) -> MatchOutcome {
    let mut topic_properties = request.clone();
    if let Some(topic) = endpoint::topic(request) {
        if let Some(props) =
            provider.topic_properties(component, endpoint::scope(request), topic, publisher)
        {
            topic_properties.merge(&props);
        }
    }

    let mut score = match topic_properties.get(ENDPOINT_ADMIN_TYPE) {
        Some(requested) if requested == admin_type => FULL_MATCH_SCORE,
        Some(_) => NO_MATCH_SCORE,
        None => match Qos::from_properties(&topic_properties) {
            Qos::Sample => scores.qos_sample,
            Qos::Control => scores.qos_control,
            Qos::Unspecified => scores.default,
        },
    };

    let serializer = match topic_properties.get(ENDPOINT_SERIALIZER) {
        Some(requested) => registry.has_type(requested).then(|| requested.to_string()),
        None => registry.types().into_iter().next(),
    };
    if serializer.is_none() {
        score = NO_MATCH_SCORE;
    }

    MatchOutcome {
        score,
        topic_properties,
        serializer,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::endpoint::TOPIC_NAME;
    use crate::serializer::{MessageVersion, RawSerializer, SerializerInfo};

    fn registry_with(types: &[&str]) -> SerializerRegistry {
        let registry = SerializerRegistry::new();
        for (i, ty) in types.iter().enumerate() {
            registry.insert(
                SerializerInfo::new(*ty, i as u32, "a.A", MessageVersion::default()),
                Arc::new(RawSerializer),
            );
        }
        registry
    }

    fn run(request: &Properties, registry: &SerializerRegistry) -> MatchOutcome {
        score(1, request, true, "socket", &MatchScores::default(), registry, &NoTopicProperties)
    }

    #[test]
    fn test_qos_weights() {
        let registry = registry_with(&["json"]);
        let base = Properties::new().with(TOPIC_NAME, "t");

        assert_eq!(run(&base, &registry).score, DEFAULT_SCORE);
        assert_eq!(run(&base.clone().with(QOS, "sample"), &registry).score, DEFAULT_QOS_SAMPLE_SCORE);
        assert_eq!(run(&base.clone().with(QOS, "control"), &registry).score, DEFAULT_QOS_CONTROL_SCORE);
    }

    #[test]
    fn test_requested_admin() {
        let registry = registry_with(&["json"]);
        let ours = Properties::new().with(ENDPOINT_ADMIN_TYPE, "socket");
        let theirs = Properties::new().with(ENDPOINT_ADMIN_TYPE, "zmq");

        assert_eq!(run(&ours, &registry).score, FULL_MATCH_SCORE);
        assert_eq!(run(&theirs, &registry).score, NO_MATCH_SCORE);
    }

    #[test]
    fn test_no_serializer_scores_zero() {
        let empty = registry_with(&[]);
        let outcome = run(&Properties::new().with(ENDPOINT_ADMIN_TYPE, "socket"), &empty);
        assert_eq!(outcome.score, NO_MATCH_SCORE);
        assert_eq!(outcome.serializer, None);

        let registry = registry_with(&["json"]);
        let outcome = run(&Properties::new().with(ENDPOINT_SERIALIZER, "avro"), &registry);
        assert_eq!(outcome.score, NO_MATCH_SCORE);
    }

    #[test]
    fn test_serializer_selection() {
        let registry = registry_with(&["raw", "json"]);

        assert_eq!(run(&Properties::new(), &registry).serializer.as_deref(), Some("json"));
        let outcome = run(&Properties::new().with(ENDPOINT_SERIALIZER, "raw"), &registry);
        assert_eq!(outcome.serializer.as_deref(), Some("raw"));
    }

    struct SampleEverything;

    impl TopicPropertiesProvider for SampleEverything {
        fn topic_properties(&self, _: ComponentId, _: Option<&str>, _: &str, _: bool) -> Option<Properties> {
            Some(Properties::new().with(QOS, "sample"))
        }
    }

    #[test]
    fn test_provider_properties_merged() {
        let registry = registry_with(&["json"]);
        let request = Properties::new().with(TOPIC_NAME, "t").with(QOS, "control");

        let outcome = score(
            1,
            &request,
            false,
            "socket",
            &MatchScores::default(),
            &registry,
            &SampleEverything,
        );

        assert_eq!(outcome.score, DEFAULT_QOS_SAMPLE_SCORE);
        assert_eq!(outcome.topic_properties.get(QOS), Some("sample"));
        assert_eq!(outcome.topic_properties.get(TOPIC_NAME), Some("t"));
    }
}
