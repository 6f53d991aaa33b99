pub use anyhow::{bail, ensure, format_err, Context as _, Error, Result};
pub use derivative::Derivative;
pub use label_list::{
    LabelConflictPolicy, LabelGroup, LabelLayout, LabelListParserInit, Manifest, Record,
};
pub use noisy_float::prelude::*;
pub use rand::{prelude::*, rngs::StdRng};
pub use serde::{Deserialize, Serialize};
pub use std::{
    fmt::Debug,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};
pub use tch::{vision, Device, IndexOp, Kind, Tensor};
pub use tch_tensor_like::TensorLike;
pub use tracing::{debug, info, warn};
