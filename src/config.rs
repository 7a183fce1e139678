//! Loader configuration.

use bon::Builder;

/// Sentinel meaning "no column assigned to this role".
pub const NO_SPECIFIC: i32 = -1;

/// Configuration for [`DatasetLoader`](crate::DatasetLoader).
///
/// Column roles (`label_column`, `weight_column`, `group_column`,
/// `ignore_column`) accept either a zero-based column index (`"2"`) or a
/// header name with the `name:` prefix (`"name:label"`). `ignore_column`
/// takes a comma-separated list; a single leading `name:` applies to the
/// whole list.
///
/// # Example
///
/// ```ignore
/// use treeline::LoadConfig;
///
/// let config = LoadConfig::builder()
///     .has_header(true)
///     .label_column("name:label")
///     .max_bin(63)
///     .build();
/// ```
#[derive(Clone, Debug, Builder)]
#[builder(derive(Clone, Debug))]
pub struct LoadConfig {
    /// Data file has a header line.
    #[builder(default = false)]
    pub has_header: bool,

    /// Label column spec. Defaults to column 0.
    #[builder(default, into)]
    pub label_column: String,

    /// Weight column spec; empty means no weights.
    #[builder(default, into)]
    pub weight_column: String,

    /// Group/query column spec; empty means no groups.
    #[builder(default, into)]
    pub group_column: String,

    /// Columns to drop from the feature set.
    #[builder(default, into)]
    pub ignore_column: String,

    /// Maximum number of bins per feature.
    #[builder(default = 255)]
    pub max_bin: usize,

    /// Number of sampled rows used to learn bin boundaries.
    #[builder(default = 200_000)]
    pub bin_construct_sample_cnt: usize,

    /// Stream the file twice instead of holding all lines in memory.
    #[builder(default = false)]
    pub use_two_round_loading: bool,

    /// The input file is already split per machine; read every row.
    #[builder(default = false)]
    pub is_pre_partition: bool,

    /// Allow sparse storage for mostly-zero feature columns.
    #[builder(default = true)]
    pub is_enable_sparse: bool,

    /// Number of classes (>= 1); sizes the init-score matrix.
    #[builder(default = 1)]
    pub num_class: usize,

    /// Seed for row sampling and machine partitioning.
    ///
    /// Whether a feature is dropped as trivial is decided from a random
    /// sample, so the surviving feature set can change with this seed.
    #[builder(default = 1)]
    pub data_random_seed: u64,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}
