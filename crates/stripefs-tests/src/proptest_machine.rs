//! Property tests over the engine: arbitrary completion codes and mixed
//! workloads must always drain to an idle scheduler with one reply per
//! admitted request.
