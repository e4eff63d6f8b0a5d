use derive_more::{Constructor, Display};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Copy,
            Clone,
            Eq,
            PartialEq,
            Ord,
            PartialOrd,
            Hash,
            Deserialize,
            Serialize,
            Display,
            Constructor,
        )]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn random() -> Self {
                Self(Uuid::new_v4())
            }
        }
    };
}

uuid_id!(PortfolioId);
uuid_id!(OrderId);
uuid_id!(SignalId);
uuid_id!(PredictorId);
