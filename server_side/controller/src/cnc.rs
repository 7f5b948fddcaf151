pub mod dispatch;
pub mod fault;
pub mod gcode;
pub mod motion;
pub mod report;
pub mod state;
