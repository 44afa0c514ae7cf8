pub mod animation;
pub mod clip;
pub mod effect;
pub mod material;
pub mod timeline;
pub mod track;
pub mod transition;
