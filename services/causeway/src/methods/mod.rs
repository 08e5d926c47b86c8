pub mod catalogue;
pub mod external;
pub mod mock;
pub mod traits;

pub use catalogue::{DiscoveryMethod, MethodRegistry, MethodSpec, CATALOGUE};
pub use external::ExternalDiscovery;
pub use mock::{MockDiscovery, StaticDiscovery};
pub use traits::{AlgorithmError, DiscoveryAlgorithm};
