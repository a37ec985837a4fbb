pub mod mutation;
pub mod session;
pub mod vnode;
