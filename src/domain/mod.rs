//! Domain layer containing core types, traits, and error definitions.

pub mod error;
pub mod traits;
pub mod types;

pub use error::{
    AppError, ConfigError, DocStoreError, KvError, LlmError, TableError, ValidationError,
};
pub use traits::{
    DocumentStore, ErrorSink, KvStore, LlmClient, TableTransport, TracingErrorSink,
};
pub use types::{
    BackendHealth, BatchInvokeRequest, BatchInvokeResponse, BatchItem, CacheValueResponse,
    DocDeleteResponse, DocQueryParams, DocQuerySpec, DocRowsResponse, DocWriteRequest,
    ErrorBody, HashAllResponse, HashFieldResponse, HashSetRequest, HashSetResponse,
    HealthResponse, HealthStatus,
    InvokeRequest, InvokeResponse, KvDeleteResponse, KvSetResponse, KvStats, KvStatsResponse,
    KvValueResponse, ListPushRequest, ListPushResponse, ListRangeParams, ListRangeResponse,
    ListRecordsOptions, NotFoundBody, PushDirection, RateLimitBody, RecordPage, RecordPatch,
    ServicesHealth, SessionCreateRequest, SessionCreateResponse, SessionResponse, SetAddRequest,
    SetAddResponse, SetKeyRequest, SetMembersResponse, SortDirection, SortSpec, StoredValue,
    TableRecord,
};
