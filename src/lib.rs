#![doc = include_str!("../README.md")]

#[cfg(feature = "test-util")]
pub use bubblestore_core::test;
pub use bubblestore_core::{
    application,
    application::{Application, RequestResult},
    orchestrator,
    orchestrator::{ExecutableRequest, ExecuteError, Execution, Orchestrator},
    uuid,
    uuid::{generate_uuid, is_uuid},
};

pub mod persistence {

    pub use bubblestore_core::persistence::{
        Bubble, Persistence, RecordOutcome, StoredEvent, inmemory,
    };

    #[cfg(feature = "sqlite")]
    #[cfg_attr(docsrs, doc(cfg(feature = "sqlite")))]
    pub mod sqlite {
        pub use bubblestore_sqlite::{Error, Store};
    }

    #[cfg(feature = "dynamodb")]
    #[cfg_attr(docsrs, doc(cfg(feature = "dynamodb")))]
    pub mod dynamodb {
        pub use bubblestore_dynamodb::{
            Billing, BubbleAttributeNames, BubbleTableSettings, Encryption, Error,
            EventAttributeNames, EventTableSettings, Store, TableSettings,
        };
    }
}
