//! UPDATE/DELETE collectors (spec.md §4.6 "special-purpose UPDATE/DELETE
//! queues"): accumulate docids (or docid/row pairs) produced by a query
//! and flush them to the index writer in bounded batches, rather than
//! issuing one write per match.

use crate::docid::DocId;

/// The write-side contract the queues flush into; owned and implemented
/// by the embedder, mirroring [`crate::ranker::RankerIndex`]'s read-side
/// contract.
pub trait IndexWriter {
    fn delete_batch(&mut self, docids: &[DocId]);
    fn update_batch(&mut self, rows: &[(DocId, Vec<u8>)]);
}

/// Buffers docids to delete, flushing every `batch_size` entries.
pub struct DeleteQueue<'a> {
    writer: &'a mut dyn IndexWriter,
    batch_size: usize,
    buf: Vec<DocId>,
    total_flushed: u64,
}

impl<'a> DeleteQueue<'a> {
    pub fn new(writer: &'a mut dyn IndexWriter, batch_size: usize) -> Self {
        DeleteQueue { writer, batch_size, buf: Vec::with_capacity(batch_size), total_flushed: 0 }
    }

    pub fn push(&mut self, docid: DocId) {
        self.buf.push(docid);
        if self.buf.len() >= self.batch_size {
            self.flush();
        }
    }

    pub fn flush(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        self.writer.delete_batch(&self.buf);
        self.total_flushed += self.buf.len() as u64;
        self.buf.clear();
    }

    pub fn total_flushed(&self) -> u64 {
        self.total_flushed
    }
}

impl Drop for DeleteQueue<'_> {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Buffers `(docid, row)` updates, flushing every `batch_size` entries.
pub struct UpdateQueue<'a> {
    writer: &'a mut dyn IndexWriter,
    batch_size: usize,
    buf: Vec<(DocId, Vec<u8>)>,
    total_flushed: u64,
}

impl<'a> UpdateQueue<'a> {
    pub fn new(writer: &'a mut dyn IndexWriter, batch_size: usize) -> Self {
        UpdateQueue { writer, batch_size, buf: Vec::with_capacity(batch_size), total_flushed: 0 }
    }

    pub fn push(&mut self, docid: DocId, row: Vec<u8>) {
        self.buf.push((docid, row));
        if self.buf.len() >= self.batch_size {
            self.flush();
        }
    }

    pub fn flush(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        self.writer.update_batch(&self.buf);
        self.total_flushed += self.buf.len() as u64;
        self.buf.clear();
    }

    pub fn total_flushed(&self) -> u64 {
        self.total_flushed
    }
}

impl Drop for UpdateQueue<'_> {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingWriter {
        deleted_batches: Vec<Vec<DocId>>,
        updated_batches: Vec<Vec<(DocId, Vec<u8>)>>,
    }

    impl IndexWriter for RecordingWriter {
        fn delete_batch(&mut self, docids: &[DocId]) {
            self.deleted_batches.push(docids.to_vec());
        }

        fn update_batch(&mut self, rows: &[(DocId, Vec<u8>)]) {
            self.updated_batches.push(rows.to_vec());
        }
    }

    #[test]
    fn delete_queue_flushes_in_fixed_size_batches() {
        let mut writer = RecordingWriter::default();
        {
            let mut q = DeleteQueue::new(&mut writer, 3);
            for docid in 1..=7u32 {
                q.push(docid);
            }
            // 6 flushed in two batches of 3; 1 left buffered until drop.
        }
        assert_eq!(writer.deleted_batches, vec![vec![1, 2, 3], vec![4, 5, 6], vec![7]]);
    }

    #[test]
    fn update_queue_flushes_remainder_on_drop() {
        let mut writer = RecordingWriter::default();
        {
            let mut q = UpdateQueue::new(&mut writer, 10);
            q.push(1, vec![0xAA]);
            q.push(2, vec![0xBB]);
        }
        assert_eq!(writer.updated_batches.len(), 1);
        assert_eq!(writer.updated_batches[0].len(), 2);
    }
}
