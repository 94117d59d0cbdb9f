use vmacc::builtin::Module;
use vmacc::isa::CompoundInstruction;
use vmacc::{Accelerator, AcceleratorConfig, Error};

const N: usize = 16;
const DEPTH: usize = 1024;

fn accel() -> Accelerator {
  Accelerator::new("accel", &AcceleratorConfig::new(N, DEPTH)).unwrap().with_cycle_limit(10_000)
}

fn inst(mem: &str, lane: &str) -> CompoundInstruction {
  CompoundInstruction::new(mem.parse().unwrap(), lane.parse().unwrap())
}

/// Matrix image with `rows[j]` at row j.
fn matrix_image(rows: &[Vec<u32>]) -> Vec<u32> {
  let mut image = vec![0; DEPTH];
  for (j, row) in rows.iter().enumerate() {
    image[j * N..j * N + row.len()].copy_from_slice(row);
  }
  image
}

fn output_row(accel: &Accelerator, row: usize) -> Vec<u32> {
  accel.output_memory()[row * N..(row + 1) * N].to_vec()
}

fn pack16(hi: i16, lo: i16) -> u32 {
  ((hi as u16 as u32) << 16) | lo as u16 as u32
}

#[test]
fn test_row_of_ones_times_two() {
  let mut accel = accel();
  accel.load_matrix(&matrix_image(&[vec![1; N]])).unwrap();
  accel.write_vector(0, 2).unwrap();

  accel.issue(inst("NOP", "CLR INT32")).unwrap();
  accel.issue(inst("READ INT32 0 0", "MAC INT32")).unwrap();
  accel.issue(inst("WRITE INT32 1", "OUT INT32")).unwrap();
  accel.run_until_idle(1_000).unwrap();

  assert_eq!(output_row(&accel, 1), vec![2; N]);
  assert!(accel.lanes().iter().all(|lane| lane.accumulator() == 2));
  assert_eq!(accel.read_output(N as u32 + 7).unwrap(), 2);
}

#[test]
fn test_write_places_lane_outputs_in_order() {
  let mut accel = accel();
  let row: Vec<u32> = (0..N as u32).map(|k| 100 + k).collect();
  accel.load_matrix(&matrix_image(&[vec![], row.clone()])).unwrap();
  accel.write_vector(0, 1).unwrap();

  accel.issue(inst("READ INT32 1 0", "MAC INT32")).unwrap();
  accel.issue(inst("WRITE INT32 3", "OUT INT32")).unwrap();
  accel.run_until_idle(1_000).unwrap();

  assert_eq!(output_row(&accel, 3), row);
  // neighbouring rows untouched
  assert_eq!(output_row(&accel, 2), vec![0; N]);
  assert_eq!(output_row(&accel, 4), vec![0; N]);
}

#[test]
fn test_int16_element_broadcast() {
  let mut accel = accel();
  accel.load_matrix(&matrix_image(&[vec![pack16(3, 7); N]])).unwrap();
  // element 0 = -2, element 1 = 5
  accel.write_vector(0, pack16(5, -2)).unwrap();

  for (elem, expect) in [(1, pack16(15, 35)), (0, pack16(-6, -14))] {
    accel.issue(inst("NOP", "CLR INT16")).unwrap();
    accel.issue(inst(&format!("READ INT16 0 {}", elem), "MAC INT16")).unwrap();
    accel.issue(inst("WRITE INT16 0", "OUT INT16")).unwrap();
    accel.run_until_idle(1_000).unwrap();
    assert_eq!(output_row(&accel, 0), vec![expect; N], "element {}", elem);
  }
}

#[test]
fn test_int8_element_broadcast() {
  let mut accel = accel();
  // lanes -2, 2, -1, 1
  accel.load_matrix(&matrix_image(&[vec![0x01FF_02FE; N]])).unwrap();
  accel.write_vector(0, 0x0403_0201).unwrap();

  accel.issue(inst("NOP", "CLR INT8")).unwrap();
  accel.issue(inst("READ INT8 0 2", "MAC INT8")).unwrap();
  accel.issue(inst("WRITE INT8 0", "OUT INT8")).unwrap();
  accel.run_until_idle(1_000).unwrap();

  // -6, 6, -3, 3
  assert_eq!(output_row(&accel, 0), vec![0x03FD_06FA; N]);
}

#[test]
fn test_pass_then_rnd() {
  let mut accel = accel();
  accel.write_vector(0, (-20i32) as u32).unwrap();

  accel.issue(inst("READ INT32 0 0", "PASS INT32")).unwrap();
  accel.issue(inst("NOP", "RND INT32 2")).unwrap();
  accel.issue(inst("WRITE INT32 0", "OUT INT32")).unwrap();
  accel.run_until_idle(1_000).unwrap();

  assert_eq!(output_row(&accel, 0), vec![(-5i32) as u32; N]);
}

#[test]
fn test_mac_then_rnd() {
  let mut accel = accel();
  accel.load_matrix(&matrix_image(&[vec![7; N]])).unwrap();
  accel.write_vector(0, (-9i32) as u32).unwrap();

  accel.issue(inst("NOP", "CLR INT32")).unwrap();
  accel.issue(inst("READ INT32 0 0", "MAC INT32")).unwrap();
  accel.issue(inst("NOP", "RND INT32 3")).unwrap();
  accel.issue(inst("WRITE INT32 0", "OUT INT32")).unwrap();
  accel.run_until_idle(1_000).unwrap();

  // -63 >> 3 rounds toward negative infinity
  assert_eq!(output_row(&accel, 0), vec![(-8i32) as u32; N]);
}

#[test]
fn test_looped_gemv() {
  // y[k] = sum_j M[j][k] * v[j], 8 rows in one compound instruction
  const ROWS: usize = 8;
  let rows: Vec<Vec<u32>> = (0..ROWS)
    .map(|j| (0..N).map(|k| (j * N + k) as u32 % 7).collect())
    .collect();
  let vector: Vec<i32> = (0..ROWS as i32).map(|j| j - 3).collect();

  let mut accel = accel();
  accel.load_matrix(&matrix_image(&rows)).unwrap();
  for (j, v) in vector.iter().enumerate() {
    accel.write_vector(j as u32, *v as u32).unwrap();
  }

  accel.issue(inst("NOP", "CLR INT32")).unwrap();
  accel
    .issue(
      inst("READ INT32 0 0", "MAC INT32")
        .with_count(ROWS as u16 - 1)
        .with_increments(true, true),
    )
    .unwrap();
  accel.issue(inst("WRITE INT32 10", "OUT INT32")).unwrap();
  accel.run_until_idle(1_000).unwrap();

  let expect: Vec<u32> = (0..N)
    .map(|k| (0..ROWS).map(|j| rows[j][k] as i32 * vector[j]).sum::<i32>() as u32)
    .collect();
  assert_eq!(output_row(&accel, 10), expect);
  assert_eq!(accel.sequencer.issued(), ROWS as u64 + 2);
}

#[test]
fn test_deeper_channels_same_result() {
  let run = |depth: usize| {
    let config = AcceleratorConfig::new(N, DEPTH).with_channel_depth(depth);
    let mut accel = Accelerator::new("accel", &config).unwrap();
    accel.load_matrix(&matrix_image(&[(0..N as u32).collect(), vec![3; N]])).unwrap();
    accel.write_vector(0, 4).unwrap();
    accel.write_vector(1, 5).unwrap();
    accel.issue(inst("NOP", "CLR INT32")).unwrap();
    accel
      .issue(inst("READ INT32 0 0", "MAC INT32").with_count(1).with_increments(true, true))
      .unwrap();
    accel.issue(inst("WRITE INT32 2", "OUT INT32")).unwrap();
    accel.run_until_idle(1_000).unwrap();
    output_row(&accel, 2)
  };
  let expect: Vec<u32> = (0..N as u32).map(|k| 4 * k + 15).collect();
  assert_eq!(run(1), expect);
  assert_eq!(run(4), expect);
}

#[test]
fn test_mispaired_program_hits_cycle_limit() {
  let mut accel = accel();
  // OUT with no WRITE: the lanes fill their output channels and wait
  accel.issue(inst("NOP", "OUT INT32")).unwrap();
  accel.issue(inst("NOP", "OUT INT32")).unwrap();
  assert!(matches!(accel.run_until_idle(200), Err(Error::CycleLimit(200))));
  assert!(!accel.is_idle());

  // a matching WRITE drains them
  accel.issue(inst("WRITE INT32 0", "NOP INT32").with_count(1)).unwrap();
  accel.run_until_idle(200).unwrap();
}

#[test]
fn test_reset_clears_everything() {
  let mut accel = accel();
  accel.write_vector(0, 9).unwrap();
  accel.issue(inst("READ INT32 0 0", "PASS INT32")).unwrap();
  accel.run_until_idle(100).unwrap();
  assert!(accel.cycles() > 0);
  assert_eq!(accel.lane(0).accumulator(), 9);

  accel.reset();
  assert_eq!(accel.cycles(), 0);
  assert!(accel.is_idle());
  assert!(accel.accumulators().iter().all(|&acc| acc == 0));
  assert_eq!(accel.vector_memory().read(0), 0);
}
