//! Persisted per-frame records written by the extraction pipeline.
//!
//! Records are written length-delimited, one `FrameRecord` per decoded frame.

pub mod proto {
    /// One motion vector, fields in the fixed column order of the flat
    /// `count x 10` buffer.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct MotionVector {
        /// Negative when the block is predicted from the past, positive from the future.
        #[prost(sint32, tag = "1")]
        pub source: i32,
        #[prost(sint32, tag = "2")]
        pub w: i32,
        #[prost(sint32, tag = "3")]
        pub h: i32,
        #[prost(sint32, tag = "4")]
        pub src_x: i32,
        #[prost(sint32, tag = "5")]
        pub src_y: i32,
        #[prost(sint32, tag = "6")]
        pub dst_x: i32,
        #[prost(sint32, tag = "7")]
        pub dst_y: i32,
        #[prost(sint32, tag = "8")]
        pub motion_x: i32,
        #[prost(sint32, tag = "9")]
        pub motion_y: i32,
        #[prost(sint32, tag = "10")]
        pub motion_scale: i32,
    }

    /// Everything extracted from one decoded frame except its pixels.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct FrameRecord {
        /// 1-based position of the frame within its stream.
        #[prost(uint64, tag = "1")]
        pub frame_number: u64,
        /// Single-character picture type (`I`, `P`, `B`, ... or `?`).
        #[prost(string, tag = "2")]
        pub frame_type: ::prost::alloc::string::String,
        /// Unix time of the frame in seconds.
        #[prost(double, tag = "3")]
        pub timestamp: f64,
        #[prost(uint32, tag = "4")]
        pub width: u32,
        #[prost(uint32, tag = "5")]
        pub height: u32,
        #[prost(message, repeated, tag = "6")]
        pub motion_vectors: ::prost::alloc::vec::Vec<MotionVector>,
        /// File path or URL the frame was read from.
        #[prost(string, tag = "7")]
        pub source_url: ::prost::alloc::string::String,
    }
}
