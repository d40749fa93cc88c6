// crates/fb_mules/src/parallel/mod.rs

//! 分区并行
//!
//! - [`halo`]: 光环交换与全局归约接口及其单进程、进程内多 rank 实现
//! - [`decompose`]: 区域分解、数据分发与汇总、按 rank 启动作用域线程

pub mod decompose;
pub mod halo;

pub use decompose::{
    decompose, decompose_blocks, gather_cells, gather_faces, run_decomposed, FaceSource,
    SubDomain,
};
pub use halo::{ChannelHalo, HaloExchange, SerialHalo};
