//! System-wide constants.

/// Separator between project and resource names. Compose v2 uses `-` for
/// container names.
pub const DEFAULT_PROJECT_SEPARATOR: &str = "-";

/// Namespace prefix for labels that feed the override channel.
pub const LABEL_PREFIX: &str = "unitsmith";

/// Network Compose declares implicitly for every project.
pub const DEFAULT_NETWORK: &str = "default";

/// Log driver used when the manifest does not override it.
pub const DEFAULT_LOG_DRIVER: &str = "journald";

/// Log driver Compose applies implicitly; treated as "no override".
pub const COMPOSE_DEFAULT_LOG_DRIVER: &str = "json-file";

/// Window after which the start-rate limit resets (one day).
pub const DEFAULT_START_LIMIT_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// First restart delay of Docker's restart backoff.
pub const DOCKER_BACKOFF_INITIAL_MS: u64 = 100;

/// Ceiling of Docker's restart backoff.
pub const DOCKER_BACKOFF_MAX_SECS: u64 = 60;

/// Doublings needed to go from the initial delay to the ceiling.
pub const DOCKER_BACKOFF_STEPS: u32 = 10;

/// Default Compose manifest path.
pub const DEFAULT_MANIFEST: &str = "docker-compose.yml";
