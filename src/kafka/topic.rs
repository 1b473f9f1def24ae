use std::fmt;

/// Name of a Kafka topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Topic(String);

impl Topic {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Topic {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for Topic {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> Self {
        topic.0
    }
}

/// Picks the destination topic of an event.
///
/// Routing is total and must not have side effects; it runs once per event
/// before any mutator.
pub trait TopicRouter<E>: Send + Sync {
    fn route(&self, event: &E) -> Topic;
}

impl<E, F> TopicRouter<E> for F
where
    F: Fn(&E) -> Topic + Send + Sync,
{
    fn route(&self, event: &E) -> Topic {
        self(event)
    }
}

/// Routes every event to the same topic.
#[derive(Debug, Clone)]
pub struct StaticRouter(Topic);

impl StaticRouter {
    pub fn new(topic: impl Into<Topic>) -> Self {
        Self(topic.into())
    }
}

impl<E> TopicRouter<E> for StaticRouter {
    fn route(&self, _event: &E) -> Topic {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_router() {
        let router = |n: &u32| Topic::from(format!("events.{}", n % 2));
        assert_eq!(router.route(&3).as_str(), "events.1");
        assert_eq!(router.route(&4).as_str(), "events.0");
    }

    #[test]
    fn test_static_router() {
        let router = StaticRouter::new("topic-A");
        assert_eq!(TopicRouter::<()>::route(&router, &()), Topic::from("topic-A"));
    }
}
