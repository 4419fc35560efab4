use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("unable to infer read length: no usable record among the first {n_scanned} alignments")]
    CannotInferReadLength { n_scanned: u64 },
    #[error("alignment stream contains no records")]
    NoReads,
    #[error(
        "read buffer overflow: more than {capacity} alignments retained while the stream offers \
         no random access; supply an indexed file or increase buffer-size"
    )]
    BufferOverflow { capacity: usize },
    #[error("reference name {name} not found in the alignment header")]
    UnknownReferenceName { name: String },
    #[error("stream does not support random access")]
    RandomAccessUnsupported,
}
