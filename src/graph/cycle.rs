#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnPath,
    Done,
}

/// Depth-first search for one concrete cycle among `candidates`.
///
/// `visit_order` decides which node each search starts from; edges are
/// followed in declaration order. The returned path repeats its first node
/// at the end, e.g. `[a, b, a]`.
pub(super) fn find_cycle(
    dependencies: &[Vec<usize>],
    candidates: &[bool],
    visit_order: &[usize],
) -> Option<Vec<usize>> {
    let mut marks = vec![Mark::Unvisited; dependencies.len()];

    for &start in visit_order {
        if !candidates[start] || marks[start] != Mark::Unvisited {
            continue;
        }

        // (node, index of the next edge to follow)
        let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
        marks[start] = Mark::OnPath;

        while let Some(top) = stack.len().checked_sub(1) {
            let (node, edge) = stack[top];
            if edge >= dependencies[node].len() {
                marks[node] = Mark::Done;
                stack.pop();
                continue;
            }

            stack[top].1 += 1;
            let next = dependencies[node][edge];
            if !candidates[next] {
                continue;
            }

            match marks[next] {
                Mark::OnPath => {
                    let from = stack.iter().position(|(n, _)| *n == next)?;
                    let mut cycle: Vec<usize> = stack[from..].iter().map(|(n, _)| *n).collect();
                    cycle.push(next);
                    return Some(cycle);
                }
                Mark::Unvisited => {
                    marks[next] = Mark::OnPath;
                    stack.push((next, 0));
                }
                Mark::Done => {}
            }
        }
    }

    None
}
