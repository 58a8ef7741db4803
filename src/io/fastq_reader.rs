// FASTQ reader module using bio::io::fastq
//
// Thin wrapper around bio::io::fastq with:
// - Automatic gzip detection by file extension
// - Batch reading to match the processing pattern (512 reads at a time)

use bio::io::fastq;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{self, BufReader, Read};

/// Batch of FASTQ reads
pub struct ReadBatch {
    pub names: Vec<String>,
    pub seqs: Vec<Vec<u8>>,
    pub quals: Vec<String>,
}

impl ReadBatch {
    pub fn new() -> Self {
        Self {
            names: Vec::new(),
            seqs: Vec::new(),
            quals: Vec::new(),
        }
    }

    /// Number of reads in this batch
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Total bases in this batch
    pub fn bases(&self) -> usize {
        self.seqs.iter().map(|s| s.len()).sum()
    }
}

impl Default for ReadBatch {
    fn default() -> Self {
        Self::new()
    }
}

/// FASTQ reader with automatic gzip detection
pub struct FastqReader {
    records: fastq::Records<BufReader<Box<dyn Read + Send>>>,
}

impl FastqReader {
    /// Open a FASTQ file (.fq, .fastq, .fq.gz, .fastq.gz)
    pub fn new(path: &str) -> io::Result<Self> {
        const BUFFER_SIZE: usize = 4 * 1024 * 1024;

        let reader: Box<dyn Read + Send> = if path.ends_with(".gz") {
            let file = File::open(path)?;
            Box::new(BufReader::with_capacity(BUFFER_SIZE, GzDecoder::new(file)))
        } else {
            let file = File::open(path)?;
            Box::new(BufReader::with_capacity(BUFFER_SIZE, file))
        };

        let fastq_reader = fastq::Reader::new(reader);

        Ok(Self {
            records: fastq_reader.records(),
        })
    }

    /// Read a batch of up to `batch_size` reads. Returns an empty batch at
    /// EOF.
    pub fn read_batch(&mut self, batch_size: usize) -> io::Result<ReadBatch> {
        let mut batch = ReadBatch::new();

        for _ in 0..batch_size {
            match self.records.next() {
                Some(Ok(record)) => {
                    batch.names.push(record.id().to_string());
                    batch.seqs.push(record.seq().to_vec());
                    batch
                        .quals
                        .push(String::from_utf8_lossy(record.qual()).into_owned());
                }
                Some(Err(e)) => {
                    return Err(io::Error::new(io::ErrorKind::Other, e));
                }
                None => {
                    // EOF
                    break;
                }
            }
        }

        Ok(batch)
    }
}
