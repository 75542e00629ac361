use avida_core::CpuStack;

#[test]
fn eleventh_push_overwrites_the_oldest_entry() {
    let mut stack: CpuStack<i32> = CpuStack::new(10);
    for value in 0..=10 {
        stack.push(value);
    }
    assert_eq!(*stack.peek(), 10);
    let contents: Vec<i32> = stack.iter().copied().collect();
    assert_eq!(contents, (1..=10).rev().collect::<Vec<_>>());

    for expected in (1..=10).rev() {
        assert_eq!(stack.pop(), expected);
    }
    // Everything left is the default value.
    assert_eq!(stack.pop(), 0);
}
