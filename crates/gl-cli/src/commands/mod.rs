//! CLI command implementations

mod config;
mod equipment;
mod guider;
mod profile;

pub use config::{config_get, config_init, config_show};
pub use equipment::{equipment_apply, equipment_list};
pub use guider::{
    guider_dec_mode, guider_dither, guider_exposure, guider_guide, guider_lock, guider_loop,
    guider_optics, guider_param_get, guider_param_list, guider_param_set, guider_pause,
    guider_profiles, guider_status, guider_stop,
};
pub use profile::{
    profile_create, profile_current, profile_delete, profile_duplicate, profile_export,
    profile_get, profile_list, profile_remove, profile_rename, profile_section, profile_set,
    profile_show,
};
