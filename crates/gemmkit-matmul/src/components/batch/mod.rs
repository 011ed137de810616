mod swizzle;

pub use swizzle::*;
