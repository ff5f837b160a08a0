// Cross-thread FIFO behaviour of the command queue

#[cfg(test)]
mod tests {
    use std::thread;

    use platform_middleware::{Command, CommandQueue, MovementCommand, QueueEntry};

    const ITEMS: u32 = 10_000;

    #[test]
    fn test_single_producer_single_consumer_keeps_order() {
        let queue: CommandQueue<u32> = CommandQueue::new();
        let producer = {
            let queue = queue.clone();
            thread::spawn(move || {
                for i in 0..ITEMS {
                    queue.push(i);
                    if i % 1000 == 0 {
                        thread::yield_now();
                    }
                }
            })
        };

        let mut received = Vec::with_capacity(ITEMS as usize);
        while received.len() < ITEMS as usize {
            match queue.try_pop() {
                Some(i) => received.push(i),
                None => thread::yield_now(),
            }
        }
        producer.join().unwrap();

        assert!(queue.is_empty());
        assert!(received.iter().copied().eq(0..ITEMS));
    }

    #[test]
    fn test_reset_markers_stay_in_place_across_threads() {
        let queue = CommandQueue::new();
        let producer = {
            let queue = queue.clone();
            thread::spawn(move || {
                for i in 0..100 {
                    if i % 10 == 0 {
                        queue.push(QueueEntry::ResetShaping);
                    }
                    let cmd = MovementCommand { x: i as f32, ..Default::default() };
                    queue.push(QueueEntry::Command(Command::Movement(cmd)));
                }
            })
        };

        let mut entries = Vec::new();
        while entries.len() < 110 {
            match queue.try_pop() {
                Some(entry) => entries.push(entry),
                None => thread::yield_now(),
            }
        }
        producer.join().unwrap();

        let mut next_x = 0.0;
        for (n, entry) in entries.iter().enumerate() {
            match entry {
                QueueEntry::ResetShaping => assert_eq!(n % 11, 0, "marker out of place at {}", n),
                QueueEntry::Command(Command::Movement(cmd)) => {
                    assert_eq!(cmd.x, next_x);
                    next_x += 1.0;
                }
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(next_x, 100.0);
    }
}
