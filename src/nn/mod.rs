pub mod activation;
pub mod dict;
pub mod linear;
pub mod module;
pub mod parameter;

pub use activation::{Activation, ActivationKind};
pub use dict::ModuleDict;
pub use linear::Linear;
pub use module::Module;
pub use parameter::Parameter;
