pub mod ccache;
pub mod engine;
pub mod etype;
pub mod hash;
pub mod kdc;
pub mod roast;
pub mod spec;
pub mod sspi;
pub mod targets;
pub mod workers;

pub use engine::{KdcEngine, KdcError, TicketHarvester};
pub use etype::{EncryptionTypeSet, Etype, EtypeChoice};
pub use hash::CrackFormat;
pub use roast::{run_batch, AttackKind, AttackResult, Batch, BatchOptions, Roaster};
pub use spec::{CredentialSpec, SecretKind, TargetDescriptor};
