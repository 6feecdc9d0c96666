pub mod interp;
pub mod ode;
pub mod special;
