//! Virtual communicator batching across many workers (spec §8 scenario 3).
//!
//! Eight workers each push a 2-element query bound for the same
//! destination rank; they must collapse into one flushed batch, and each
//! worker's reply chunk must come back in the order it was pushed.

use rankmesh::message::MAX_PAYLOAD_BYTES;
use rankmesh::rank::Rank;
use rankmesh::tag::Tag;
use rankmesh::virtual_communicator::{VirtualCommunicator, WorkerId};

#[test]
fn eight_two_element_queries_collapse_into_one_batch() {
    let elements_per_query = 2;
    let element_size_bytes = 8; // VirtualCommunicator's element width (u64).
    let mut vc = VirtualCommunicator::new(elements_per_query, elements_per_query);

    for worker in 0..8u32 {
        let base = (worker as u64) * 100;
        vc.push_query(Tag(9), Rank(3), WorkerId(worker), vec![base, base + 1]);
    }

    let (workers, elements) = vc.flush(Tag(9), Rank(3)).expect("bucket must have pending work");
    assert_eq!(workers.len(), 8, "all eight queries must fit in one batch");
    assert_eq!(
        elements.len() * element_size_bytes,
        8 * elements_per_query * element_size_bytes,
        "flushed payload must be exactly 8 * elements_per_query * element_size bytes"
    );
    assert!(
        elements.len() * element_size_bytes <= MAX_PAYLOAD_BYTES,
        "a single batch must never exceed the payload budget"
    );

    // Reply: each worker gets back double its first pushed element, in the
    // same order the queries were pushed.
    let reply: Vec<u64> = workers.iter().map(|w| (w.0 as u64) * 200).flat_map(|v| [v, v + 1]).collect();
    vc.record_reply(&workers, reply);

    for (i, worker) in workers.iter().enumerate() {
        assert!(vc.is_message_processed(*worker));
        let chunk = vc.take_message_response_elements(*worker).unwrap();
        assert_eq!(chunk, vec![(i as u64) * 200, (i as u64) * 200 + 1]);
    }
}
