//! TypeScript sources shared by extractor, engine and CLI tests.

/// Free functions, a rest parameter and a higher-order factory.
pub const MATH_TS: &str = r#"export function add(a: number, b: number): number {
  return a + b;
}

export function sum(...values: number[]): number {
  return values.reduce((total, v) => total + v, 0);
}

export const createMultiplier = (factor: number) => (value: number): number => factor * value;

export function fail(message: string): never {
  throw new Error(message);
}
"#;

/// A class with a constructor, instance methods, a static method and an
/// accessor (accessors are not listed).
pub const COUNTER_TS: &str = r#"export class Counter {
  private count: number;

  constructor(start: number = 0) {
    this.count = start;
  }

  increment(by: number = 1): number {
    this.count += by;
    return this.count;
  }

  static describe(): string {
    return "Counter";
  }

  get value(): number {
    return this.count;
  }
}
"#;

/// Async functions settled through promises and timers.
pub const ASYNC_TS: &str = r#"export async function delayed(value: number, ms: number = 5): Promise<number> {
  await new Promise((resolve) => setTimeout(resolve, ms));
  return value * 2;
}

export async function rejects(reason: string): Promise<void> {
  throw new TypeError(reason);
}

export function forever(): Promise<number> {
  return new Promise(() => {});
}
"#;

/// Runtime type names and console output.
pub const KINDS_TS: &str = r#"export function kind(value: unknown): string {
  if (value === null) return "null";
  if (typeof value === "number" && Number.isNaN(value)) return "NaN";
  return typeof value;
}

export function echo<T>(value: T): T {
  console.log("echo", value);
  return value;
}
"#;

/// A file the extractor must reject.
pub const BROKEN_TS: &str = "export function broken(a: number {\n  return a;\n}\n";
