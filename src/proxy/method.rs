//! Service definitions and method shapes
//!
//! A proxied service is described only by its fully-qualified name and its
//! method names. Each method's call shape is resolved once, when the
//! definition is bound, into a [`MethodTable`].

use std::collections::HashMap;
use std::fmt;

/// Method name prefix marking a server-streaming method
pub const STREAM_PREFIX: &str = "Stream";

/// Call shape of a method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodShape {
    /// One request, one response
    Unary,
    /// One request, a lazily consumed sequence of responses
    ServerStream,
}

impl MethodShape {
    /// Shape implied by the naming convention
    ///
    /// Names starting with [`STREAM_PREFIX`] stream; everything else,
    /// including unusual or ambiguous names, is unary.
    pub fn from_name(name: &str) -> Self {
        if name.starts_with(STREAM_PREFIX) {
            MethodShape::ServerStream
        } else {
            MethodShape::Unary
        }
    }
}

impl fmt::Display for MethodShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodShape::Unary => write!(f, "unary"),
            MethodShape::ServerStream => write!(f, "server-stream"),
        }
    }
}

/// A method name with its resolved shape
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    /// Method name as it appears in the request path
    pub name: String,
    /// Resolved call shape
    pub shape: MethodShape,
}

/// Description of a gRPC service the proxy can front
///
/// Usually declared with [`service_definition!`](crate::service_definition).
pub trait ServiceDefinition: Send + Sync + 'static {
    /// Fully-qualified service name, e.g. `io.casperlabs.comm.discovery.KademliaService`
    const NAME: &'static str;

    /// Method names exposed by the service
    const METHODS: &'static [&'static str];

    /// Shape of `method`; override for methods that break the naming convention
    fn shape(method: &str) -> MethodShape {
        MethodShape::from_name(method)
    }
}

/// Method name to shape lookup, built once per bound service
#[derive(Debug, Clone, Default)]
pub struct MethodTable {
    methods: HashMap<String, MethodShape>,
}

impl MethodTable {
    /// Resolve every method of `S`
    pub fn for_service<S: ServiceDefinition>() -> Self {
        let methods = S::METHODS
            .iter()
            .map(|name| (name.to_string(), S::shape(name)))
            .collect();
        Self { methods }
    }

    /// Shape of `method`, or `None` if the service does not expose it
    pub fn resolve(&self, method: &str) -> Option<MethodShape> {
        self.methods.get(method).copied()
    }

    /// All methods, sorted by name
    pub fn descriptors(&self) -> Vec<MethodDescriptor> {
        let mut all: Vec<_> = self
            .methods
            .iter()
            .map(|(name, shape)| MethodDescriptor { name: name.clone(), shape: *shape })
            .collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Number of methods
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Whether the table has no methods
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// Declare a unit struct implementing [`ServiceDefinition`]
///
/// ```
/// grpc_intercept_proxy::service_definition! {
///     /// Gossip service of a node
///     pub GossipService => "io.casperlabs.comm.gossiping.GossipService" {
///         "NewBlocks", "StreamAncestorBlockSummaries", "GetBlockChunked",
///     }
/// }
///
/// use grpc_intercept_proxy::proxy::{MethodShape, ServiceDefinition};
/// assert_eq!(GossipService::shape("StreamAncestorBlockSummaries"), MethodShape::ServerStream);
/// ```
#[macro_export]
macro_rules! service_definition {
    ($(#[$meta:meta])* $vis:vis $ident:ident => $name:literal { $($method:literal),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default)]
        $vis struct $ident;

        impl $crate::proxy::ServiceDefinition for $ident {
            const NAME: &'static str = $name;
            const METHODS: &'static [&'static str] = &[$($method),*];
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    crate::service_definition! {
        Echo => "test.Echo" { "Echo", "StreamEcho", "streamLowercase" }
    }

    struct Chunked;

    impl ServiceDefinition for Chunked {
        const NAME: &'static str = "test.Chunked";
        const METHODS: &'static [&'static str] = &["GetBlockChunked", "Ping"];

        fn shape(method: &str) -> MethodShape {
            match method {
                "GetBlockChunked" => MethodShape::ServerStream,
                other => MethodShape::from_name(other),
            }
        }
    }

    #[test]
    fn test_shape_from_name() {
        assert_eq!(MethodShape::from_name("StreamBlockSummaries"), MethodShape::ServerStream);
        assert_eq!(MethodShape::from_name("Stream"), MethodShape::ServerStream);
        assert_eq!(MethodShape::from_name("Lookup"), MethodShape::Unary);
        assert_eq!(MethodShape::from_name("streamLowercase"), MethodShape::Unary);
        assert_eq!(MethodShape::from_name(""), MethodShape::Unary);
    }

    #[test]
    fn test_table_for_service() {
        let table = MethodTable::for_service::<Echo>();
        assert_eq!(table.len(), 3);
        assert_eq!(table.resolve("Echo"), Some(MethodShape::Unary));
        assert_eq!(table.resolve("StreamEcho"), Some(MethodShape::ServerStream));
        assert_eq!(table.resolve("Missing"), None);

        let names: Vec<_> = table.descriptors().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["Echo", "StreamEcho", "streamLowercase"]);
    }

    #[test]
    fn test_shape_override() {
        let table = MethodTable::for_service::<Chunked>();
        assert_eq!(table.resolve("GetBlockChunked"), Some(MethodShape::ServerStream));
        assert_eq!(table.resolve("Ping"), Some(MethodShape::Unary));
    }
}
