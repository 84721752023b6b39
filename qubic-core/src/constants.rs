/// QubicDB system version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default matrix dimensionality bounds.
pub const DEFAULT_MIN_DIM: usize = 3;
pub const DEFAULT_MAX_DIM: usize = 11;

/// Default matrix population bounds.
pub const DEFAULT_MIN_NEURONS: usize = 10;
pub const DEFAULT_MAX_NEURONS: usize = 10_000;

/// Maximum neuron content size in bytes.
pub const DEFAULT_CONTENT_LIMIT: usize = 10 * 1024;

/// Per-worker operation queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Energy added to a neuron each time it fires.
pub const FIRE_ENERGY_BOOST: f64 = 0.1;

/// Floor energy assigned to new neurons.
pub const DEFAULT_BASE_ENERGY: f64 = 0.1;

/// Neurons at or below this energy are dormant and eligible for pruning.
pub const DORMANT_ENERGY_THRESHOLD: f64 = 0.01;

/// Synapses below this weight are dead; neurons at or below it are
/// filtered from search results.
pub const ALIVE_WEIGHT_THRESHOLD: f64 = 0.05;

/// Default energy decay rate, in energy units per hour.
pub const DEFAULT_DECAY_RATE: f64 = 0.01;

/// Minimum synapse weight for an edge to be followed during search spread.
pub const DEFAULT_LINK_THRESHOLD: f64 = 0.3;

/// Default consolidation frequency parameter, in hours.
pub const DEFAULT_CONSOL_FREQUENCY: f64 = 24.0;

/// Co-activation window: two fires within this span form or strengthen
/// a synapse.
pub const DEFAULT_COACTIVATION_WINDOW_MS: u64 = 5_000;

/// Hebbian learning rate (fraction of remaining headroom per co-fire).
pub const DEFAULT_LEARNING_RATE: f64 = 0.1;

/// Synapse weight decay rate, in weight units per hour.
pub const DEFAULT_FORGETTING_RATE: f64 = 0.01;

/// Initial weight of a newly formed synapse.
pub const DEFAULT_MIN_WEIGHT_TO_FORM: f64 = 0.3;

/// Maximum number of neighbours a neuron may acquire through formation.
pub const DEFAULT_MAX_SYNAPSES_PER_NEURON: usize = 50;

/// Consolidation promotes a neuron when access_count reaches this value...
pub const CONSOLIDATION_ACCESS_THRESHOLD: u64 = 5;
/// ...and it is at least this old...
pub const CONSOLIDATION_AGE_HOURS: i64 = 24;
/// ...and its energy has cooled below this ceiling.
pub const CONSOLIDATION_ENERGY_CEILING: f64 = 0.5;

/// Blend factor between lexical and embedding scores in search.
pub const DEFAULT_SEARCH_ALPHA: f64 = 0.5;
